use serde::de::DeserializeOwned;
use serde::Serialize;

use ghdb_types::{DocPath, TypeError};

/// A typed document stored at a fixed path.
///
/// `empty()` is what the path holds before anyone has written it.
pub trait DocumentSchema: Serialize + DeserializeOwned + Send + Sync + 'static {
    const PATH: &'static str;

    fn empty() -> Self;

    fn doc_path() -> Result<DocPath, TypeError> {
        DocPath::new(Self::PATH)
    }
}
