use serde::{Deserialize, Serialize};

pub fn get_load_identifier(cluster_name: &str, image_digest: &str) -> String {
    format!("{}|{}", cluster_name, image_digest)
}

/// Proof that an image was pushed to every node of a cluster. Keyed on the
/// image digest rather than the reference, so rebuilding the image under the
/// same tag produces a different record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LoadRecord {
    pub image: String,
    pub cluster_name: String,
    pub resolved_image_digest: String,
}

impl LoadRecord {
    pub fn id(&self) -> String {
        get_load_identifier(&self.cluster_name, &self.resolved_image_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_identity_follows_digest() {
        let before = LoadRecord {
            image: "myapp:latest".to_string(),
            cluster_name: "c1".to_string(),
            resolved_image_digest: "sha256:aaa".to_string(),
        };
        let rebuilt = LoadRecord {
            resolved_image_digest: "sha256:bbb".to_string(),
            ..before.clone()
        };
        assert_eq!(before.id(), "c1|sha256:aaa");
        assert_eq!(before.image, rebuilt.image);
        assert_ne!(before.id(), rebuilt.id());
    }
}
