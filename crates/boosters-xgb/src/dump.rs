//! Text model dumps, feature importance counts and feature maps.
//!
//! A dump is one text block per tree. Split nodes name their feature between
//! `[` and the comparison, e.g.
//!
//! ```text
//! 0:[f1<0.5] yes=1,no=2,missing=1
//!     1:leaf=0.1
//!     2:leaf=-0.1
//! ```
//!
//! Counting split lines per feature gives the "weight" importance that
//! [`ModelDump::feature_score`] returns.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use thiserror::Error;

/// Split count per feature identifier.
pub type FeatureScore = BTreeMap<String, u32>;

// =============================================================================
// ModelDump
// =============================================================================

/// Per-tree text dump of a model, in tree order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDump {
    trees: Vec<String>,
}

impl ModelDump {
    pub fn new(trees: Vec<String>) -> Self {
        Self { trees }
    }

    pub fn trees(&self) -> &[String] {
        &self.trees
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Write the canonical dump text: a `booster [i]:` header line before each
    /// tree, trees in order.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write!(writer, "{self}")?;
        writer.flush()
    }

    /// Count how many split nodes use each feature.
    pub fn feature_score(&self) -> FeatureScore {
        let mut scores = FeatureScore::new();
        for line in self.trees.iter().flat_map(|tree| tree.lines()) {
            if let Some(feature) = parse_feature_id(line) {
                *scores.entry(feature.to_owned()).or_insert(0) += 1;
            }
        }
        scores
    }
}

impl fmt::Display for ModelDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tree) in self.trees.iter().enumerate() {
            write!(f, "booster [{i}]:\n{tree}")?;
        }
        Ok(())
    }
}

/// Feature identifier of a split line, or `None` for leaves.
///
/// The identifier runs from the first `[` to the first `<`, `]` or `[` after
/// it, and may be empty (`0:[<1]` counts under `""`). A line with nothing
/// after its `[` is treated as a leaf. Feature names containing `<` or `]`
/// cannot be recovered from the dump and are not supported.
pub fn parse_feature_id(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once('[')?;
    if rest.is_empty() {
        return None;
    }
    let end = rest.find(['<', ']', '[']).unwrap_or(rest.len());
    Some(&rest[..end])
}

// =============================================================================
// FeatureMap
// =============================================================================

/// Feature type code in a feature map file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    /// Binary indicator (`i`).
    Indicator,
    /// Continuous quantity (`q`).
    Quantitative,
    /// Integer quantity (`int`).
    Integer,
    /// Floating point quantity (`float`).
    Float,
}

impl FeatureType {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::Indicator => "i",
            FeatureType::Quantitative => "q",
            FeatureType::Integer => "int",
            FeatureType::Float => "float",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i" => Ok(FeatureType::Indicator),
            "q" => Ok(FeatureType::Quantitative),
            "int" => Ok(FeatureType::Integer),
            "float" => Ok(FeatureType::Float),
            other => Err(FeatureMapError::UnknownType(other.to_owned())),
        }
    }
}

/// Errors building or parsing a [`FeatureMap`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureMapError {
    #[error("feature name {0:?} is empty or contains whitespace")]
    InvalidName(String),

    #[error("unknown feature type {0:?}")]
    UnknownType(String),

    #[error("line {line}: expected `<index>\\t<name>\\t<type>`")]
    Malformed { line: usize },

    #[error("line {line}: expected feature index {expected}, found {found}")]
    OutOfOrder {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// Feature names and types used to label a dump.
///
/// Serialized as one `<index>\t<name>\t<type>` line per feature, indices
/// starting at 0.
///
/// # Example
///
/// ```
/// use boosters_xgb::{FeatureMap, FeatureType};
///
/// let fmap = FeatureMap::new()
///     .with_feature("age", FeatureType::Integer)
///     .unwrap()
///     .with_feature("income", FeatureType::Quantitative)
///     .unwrap();
/// assert_eq!(fmap.to_string(), "0\tage\tint\n1\tincome\tq\n");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMap {
    features: Vec<(String, FeatureType)>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature, returning its index.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        feature_type: FeatureType,
    ) -> Result<usize, FeatureMapError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(FeatureMapError::InvalidName(name));
        }
        self.features.push((name, feature_type));
        Ok(self.features.len() - 1)
    }

    pub fn with_feature(
        mut self,
        name: impl Into<String>,
        feature_type: FeatureType,
    ) -> Result<Self, FeatureMapError> {
        self.push(name, feature_type)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.features.get(index).map(|(name, _)| name.as_str())
    }

    pub fn feature_type(&self, index: usize) -> Option<FeatureType> {
        self.features.get(index).map(|(_, ty)| *ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureType)> {
        self.features.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write!(writer, "{self}")?;
        writer.flush()
    }
}

impl fmt::Display for FeatureMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, ty)) in self.features.iter().enumerate() {
            writeln!(f, "{index}\t{name}\t{ty}")?;
        }
        Ok(())
    }
}

impl FromStr for FeatureMap {
    type Err = FeatureMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fmap = FeatureMap::new();
        for (line_no, line) in s.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let line_no = line_no + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [index, name, ty] = fields[..] else {
                return Err(FeatureMapError::Malformed { line: line_no });
            };
            let index: usize = index
                .parse()
                .map_err(|_| FeatureMapError::Malformed { line: line_no })?;
            if index != fmap.len() {
                return Err(FeatureMapError::OutOfOrder {
                    line: line_no,
                    expected: fmap.len(),
                    found: index,
                });
            }
            fmap.push(name, ty.parse()?)?;
        }
        Ok(fmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0:[f1<0.5] yes=1,no=2,missing=1", Some("f1"))]
    #[case("\t\t3:[age<30] yes=7,no=8", Some("age"))]
    #[case("0:[is_member] yes=1,no=2", Some("is_member"))]
    #[case("1:leaf=0.1", None)]
    #[case("4:[f2[", Some("f2"))]
    #[case("5:[", None)]
    #[case("6:[<1]", Some(""))]
    fn feature_id_extraction(#[case] line: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_feature_id(line), expected);
    }

    #[test]
    fn scores_single_split() {
        let dump = ModelDump::new(vec![
            "0:[f1<0.5] yes=1,no=2\n1:leaf=0.1\n2:leaf=-0.1\n".to_string(),
        ]);
        let scores = dump.feature_score();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["f1"], 1);
    }

    #[test]
    fn scores_accumulate_across_trees() {
        let dump = ModelDump::new(vec![
            "0:[f0<1] yes=1,no=2\n\t1:[f2<3] yes=3,no=4\n\t\t3:leaf=1\n\t\t4:leaf=2\n\t2:leaf=0\n"
                .to_string(),
            "0:[f0<2] yes=1,no=2\n\t1:leaf=0\n\t2:leaf=1\n".to_string(),
        ]);
        let scores = dump.feature_score();
        assert_eq!(scores.get("f0"), Some(&2));
        assert_eq!(scores.get("f2"), Some(&1));
        assert_eq!(scores.get("f1"), None);
    }

    #[test]
    fn canonical_text() {
        let dump = ModelDump::new(vec!["0:leaf=1\n".to_string(), "0:leaf=2\n".to_string()]);
        let mut out = Vec::new();
        dump.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "booster [0]:\n0:leaf=1\nbooster [1]:\n0:leaf=2\n");
        assert_eq!(dump.to_string(), text);
    }

    #[test]
    fn empty_identifier_is_counted() {
        let dump = ModelDump::new(vec!["0:[<1] yes=1,no=2\n\t1:leaf=0\n\t2:leaf=1\n".to_string()]);
        let scores = dump.feature_score();
        assert_eq!(scores.get(""), Some(&1));
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn empty_dump() {
        let dump = ModelDump::default();
        assert!(dump.is_empty());
        assert!(dump.feature_score().is_empty());
        assert_eq!(dump.to_string(), "");
    }

    #[test]
    fn feature_map_parses_written_form() {
        let text = "0\tage\tint\n1\tincome\tq\n2\tis_member\ti\n\n";
        let fmap: FeatureMap = text.parse().unwrap();
        assert_eq!(fmap.len(), 3);
        assert_eq!(fmap.name(1), Some("income"));
        assert_eq!(fmap.feature_type(2), Some(FeatureType::Indicator));
        assert_eq!(fmap.to_string(), text.trim_end().to_string() + "\n");
    }

    #[test]
    fn feature_map_rejects_bad_input() {
        assert_eq!(
            "0\tage\n".parse::<FeatureMap>(),
            Err(FeatureMapError::Malformed { line: 1 })
        );
        assert_eq!(
            "1\tage\tq\n".parse::<FeatureMap>(),
            Err(FeatureMapError::OutOfOrder {
                line: 1,
                expected: 0,
                found: 1
            })
        );
        assert_eq!(
            "0\tage\tdouble\n".parse::<FeatureMap>(),
            Err(FeatureMapError::UnknownType("double".to_string()))
        );
        assert!(matches!(
            FeatureMap::new().push("two words", FeatureType::Float),
            Err(FeatureMapError::InvalidName(_))
        ));
    }
}
