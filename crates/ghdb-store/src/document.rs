use serde_json::Value;

use ghdb_types::{DocPath, Version};

use crate::error::{StoreError, StoreResult};

/// A document read from a versioned store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Where the document lives.
    pub path: DocPath,
    /// Decoded JSON body. Always an object.
    pub value: Value,
    /// Token to pass back as the expected version on the next write.
    pub version: Version,
}

impl Document {
    pub fn new(path: DocPath, value: Value, version: Version) -> Self {
        Self {
            path,
            value,
            version,
        }
    }

    /// Deserialize the body into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| StoreError::CorruptDocument {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// Reject non-object bodies before they reach a backend.
pub(crate) fn ensure_object(path: &DocPath, value: &Value) -> StoreResult<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject { path: path.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Users {
        users: Vec<String>,
    }

    fn doc(value: Value) -> Document {
        Document::new(
            DocPath::new("users/users.json").unwrap(),
            value,
            Version::new("v1").unwrap(),
        )
    }

    #[test]
    fn decode_typed_body() {
        let d = doc(json!({"users": ["a", "b"]}));
        let users: Users = d.decode().unwrap();
        assert_eq!(users.users, vec!["a", "b"]);
    }

    #[test]
    fn decode_mismatch_is_corrupt_document() {
        let d = doc(json!({"users": 7}));
        let err = d.decode::<Users>().unwrap_err();
        assert!(matches!(err, StoreError::CorruptDocument { .. }));
    }

    #[test]
    fn ensure_object_rejects_arrays_and_scalars() {
        let p = DocPath::new("a.json").unwrap();
        assert!(ensure_object(&p, &json!({})).is_ok());
        assert!(ensure_object(&p, &json!([])).is_err());
        assert!(ensure_object(&p, &json!("x")).is_err());
        assert!(ensure_object(&p, &Value::Null).is_err());
    }
}
