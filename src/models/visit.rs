use serde::{Deserialize, Serialize};

/// One client's slot within a route on a given day, with its visit flag.
///
/// `orden` is the stable identifier within the route/day scope; the visited
/// flag is what gets flipped optimistically and replayed through the
/// pending-mutation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub orden: u32,
    pub client_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub visited: bool,
}
