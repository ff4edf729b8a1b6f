use serde::{Deserialize, Serialize};
use url::Url;

/// Access material for one cluster, taken from the current context of its
/// kubeconfig. Regenerated on every read.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClusterCredentials {
    pub kubeconfig: String,
    pub client_certificate: Vec<u8>,
    pub client_key: Vec<u8>,
    pub ca_certificate: Vec<u8>,
    pub endpoint: Url,
}

impl ClusterCredentials {
    pub fn client_certificate_pem(&self) -> String {
        String::from_utf8_lossy(&self.client_certificate).to_string()
    }

    pub fn client_key_pem(&self) -> String {
        String::from_utf8_lossy(&self.client_key).to_string()
    }

    pub fn ca_certificate_pem(&self) -> String {
        String::from_utf8_lossy(&self.ca_certificate).to_string()
    }
}
