use object_store::ContentAddress;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const POST_FILE: &str = "post.json";
pub const META_FILE: &str = "meta.json";
pub const RESERVED_FILENAMES: [&str; 2] = [POST_FILE, META_FILE];
pub const DEFAULT_POST_TYPE: &str = "plaintext";

fn default_post_type() -> String {
    DEFAULT_POST_TYPE.to_string()
}

/// Post content. Stored as `post.json`, encrypted when the post has
/// recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub body: String,
    #[serde(rename = "type", default = "default_post_type")]
    pub post_type: String,
    /// Attachment filenames in upload order
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Chain metadata. Always stored in the clear as `meta.json` so the chain
/// can be walked without any keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Recipient keys in canonical text form; empty for a public post
    #[serde(default)]
    pub to: Vec<String>,
    /// Previous post, `""` on the wire for a genesis post
    #[serde(with = "next_address", default)]
    pub next: Option<ContentAddress>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Meta {
    pub fn is_genesis(&self) -> bool {
        self.next.is_none()
    }

    pub fn is_public(&self) -> bool {
        self.to.is_empty()
    }
}

mod next_address {
    use object_store::ContentAddress;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        next: &Option<ContentAddress>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match next {
            Some(address) => serializer.collect_str(address),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ContentAddress>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(D::Error::custom)
    }
}
