//! Byte round-trip of a whole model.
//!
//! [`Booster::to_bytes`] and [`Booster::from_bytes`] move a model across
//! process boundaries. For serde integration, a `Booster` serializes as those
//! bytes, and [`BoosterSeed`] deserializes them into a fresh handle, since a
//! new native booster can only be created through a [`NativeApi`].
//!
//! ```
//! use serde::de::DeserializeSeed;
//! use boosters_xgb::testing::FakeNative;
//! use boosters_xgb::{Booster, BoosterSeed, Params};
//!
//! let api = FakeNative::new();
//! let booster = Booster::new(api.clone(), &[], &Params::new()).unwrap();
//!
//! let json = serde_json::to_string(&booster).unwrap();
//! let mut de = serde_json::Deserializer::from_str(&json);
//! let restored = BoosterSeed::new(api.clone()).deserialize(&mut de).unwrap();
//! assert_eq!(restored.to_bytes().unwrap(), booster.to_bytes().unwrap());
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::{self, DeserializeSeed, SeqAccess, Visitor};
use serde::ser::{self, Serialize, Serializer};

use crate::booster::Booster;
use crate::error::{check_call, Phase, Result};
use crate::native::NativeApi;

impl Booster {
    /// Serialize the whole model.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let _guard = self.guard();
        let handle = self.handle.live(Phase::Serialize)?;
        check_call(
            self.api(),
            Phase::Serialize,
            self.api.booster_get_model_raw(handle),
        )
    }

    /// Replace the model state with bytes from [`Booster::to_bytes`].
    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let handle = self.handle.live(Phase::Serialize)?;
        check_call(
            self.api(),
            Phase::Serialize,
            self.api.booster_load_model_from_buffer(handle, bytes),
        )?;
        log::debug!("loaded {} model bytes into booster {handle:#x}", bytes.len());
        Ok(())
    }
}

impl Serialize for Booster {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let bytes = self.to_bytes().map_err(ser::Error::custom)?;
        serializer.serialize_bytes(&bytes)
    }
}

/// Deserializes a [`Booster`] through the given native library.
#[derive(Clone)]
pub struct BoosterSeed {
    api: Arc<dyn NativeApi>,
}

impl BoosterSeed {
    pub fn new(api: Arc<dyn NativeApi>) -> Self {
        Self { api }
    }
}

impl fmt::Debug for BoosterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoosterSeed").finish_non_exhaustive()
    }
}

impl<'de> DeserializeSeed<'de> for BoosterSeed {
    type Value = Booster;

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Booster, D::Error> {
        let bytes = deserializer.deserialize_byte_buf(BytesVisitor)?;
        Booster::from_bytes(self.api, &bytes).map_err(de::Error::custom)
    }
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("serialized model bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Vec<u8>, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Vec<u8>, E> {
        Ok(v)
    }

    // Self-describing formats without a bytes type (JSON) encode them as a sequence.
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Vec<u8>, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element()? {
            bytes.push(byte);
        }
        Ok(bytes)
    }
}
