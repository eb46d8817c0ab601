use serde::{Deserialize, Serialize};

/// Block image, a named and sized virtual block device stored in a pool
///
/// Missing fields decode to their zero value so the caller can tell apart
/// a malformed body from an incomplete one.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockImage {
    /// name of the image, unique within its pool
    pub name: String,
    /// pool where the image lives
    pub pool_name: String,
    /// size of the image in bytes
    pub size: u64,
}

impl BlockImage {
    /// new image description
    pub fn new(name: &str, pool_name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            pool_name: pool_name.to_string(),
            size,
        }
    }
}

/// Pool as enumerated by the cluster
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    /// name of the pool
    pub name: String,
    /// cluster assigned pool id
    pub number: i64,
}

/// Image details returned by a stat of an opened image
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStat {
    /// size of the image in bytes
    pub size: u64,
    /// size of each backing object in bytes
    pub object_size: u64,
    /// number of backing objects
    pub num_objs: u64,
    /// log2 of the object size
    pub order: u8,
    /// prefix of the backing object names
    pub block_name_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_image_wire_names() {
        let image = BlockImage::new("img1", "rbd", 1048576);
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "img1", "poolName": "rbd", "size": 1048576})
        );
    }

    #[test]
    fn block_image_missing_fields_default() {
        let image: BlockImage =
            serde_json::from_str(r#"{"name":"img1","poolName":"rbd"}"#)
                .unwrap();
        assert_eq!(image, BlockImage::new("img1", "rbd", 0));

        let image: BlockImage = serde_json::from_str("{}").unwrap();
        assert_eq!(image, BlockImage::default());
    }

    #[test]
    fn block_image_rejects_wrong_shape() {
        assert!(serde_json::from_str::<BlockImage>(r#""img1""#).is_err());
        assert!(serde_json::from_str::<BlockImage>(r#"{"size":-1}"#).is_err());
        assert!(serde_json::from_str::<BlockImage>("{\"name\":").is_err());
    }
}
