use serde::{Deserialize, Serialize};

use crate::domain::{Bundle, Route};

// Bundle creation
#[derive(Debug, Deserialize)]
pub struct CreateBundleRequest {
    pub project_id: String,
    #[serde(alias = "mcp_ids")]
    pub tool_source_ids: Vec<String>,
    pub description: String,
}

// Execution
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub bundle_id: String,
    pub request: String,
}

// Bundle lookup
#[derive(Debug, Serialize)]
pub struct BundleDetail {
    #[serde(flatten)]
    pub bundle: Bundle,
    pub routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
pub struct ListBundlesQuery {
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub struct ListBundlesResponse {
    pub bundles: Vec<Bundle>,
}

#[derive(Debug, Serialize)]
pub struct ListRoutesResponse {
    pub bundle_id: String,
    pub routes: Vec<Route>,
}
