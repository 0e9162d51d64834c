use serde::Deserialize;

use crate::models::IdentityRecord;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolkitUser {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl From<ToolkitUser> for IdentityRecord {
    fn from(u: ToolkitUser) -> Self {
        IdentityRecord {
            uid: u.local_id,
            email: u.email,
            display_name: u.display_name,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchGetResponse {
    #[serde(default)]
    pub users: Vec<ToolkitUser>,
    pub next_page_token: Option<String>,
}
