//! Signed-in account lookup via the TV client `accounts_list` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AuthorizedClient;
use crate::auth::error::AuthError;

pub const ACCOUNTS_LIST_URL: &str = "https://www.youtube.com/youtubei/v1/account/accounts_list";

const TV_CLIENT_NAME: &str = "TVHTML5";
const TV_CLIENT_ID: &str = "7";
const TV_CLIENT_VERSION: &str = "7.20260124.00.00";

/// Display details of the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub name: String,
    pub email: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountsListRequest {
    context: RequestContext,
    account_read_mask: AccountReadMask,
}

#[derive(Debug, Serialize)]
struct RequestContext {
    client: ClientInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo {
    client_name: &'static str,
    client_version: &'static str,
    hl: &'static str,
    gl: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountReadMask {
    return_owner: bool,
    return_brand_accounts: bool,
    return_persona_accounts: bool,
}

impl AccountsListRequest {
    fn tv() -> Self {
        Self {
            context: RequestContext {
                client: ClientInfo {
                    client_name: TV_CLIENT_NAME,
                    client_version: TV_CLIENT_VERSION,
                    hl: "en",
                    gl: "US",
                },
            },
            account_read_mask: AccountReadMask {
                return_owner: true,
                return_brand_accounts: true,
                return_persona_accounts: false,
            },
        }
    }
}

/// Fetch the signed-in account from the production endpoint.
pub async fn fetch_account_info(client: &AuthorizedClient) -> Result<AccountInfo, AuthError> {
    fetch_account_info_from(client, ACCOUNTS_LIST_URL).await
}

pub async fn fetch_account_info_from(
    client: &AuthorizedClient,
    url: &str,
) -> Result<AccountInfo, AuthError> {
    let body = AccountsListRequest::tv();
    let resp = client
        .send(|http| {
            http.post(url)
                .header("X-Goog-Api-Format-Version", "1")
                .header("X-YouTube-Client-Name", TV_CLIENT_ID)
                .header("X-YouTube-Client-Version", TV_CLIENT_VERSION)
                .json(&body)
        })
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        tracing::warn!(%status, body = %text, "account info request failed");
        return Err(AuthError::InvalidResponse(format!(
            "account info request failed with status {status}"
        )));
    }
    let value: Value = resp.json().await?;
    parse_account_info(&value)
}

/// Extract account details from an `accounts_list` response.
///
/// The response shape varies between client versions, so several layouts
/// are tried in turn: account section lists and item renderers under
/// `contents`, then a tabbed channel header, then `selectText`.
pub fn parse_account_info(root: &Value) -> Result<AccountInfo, AuthError> {
    if let Some(info) = from_contents(root.get("contents")) {
        return Ok(info);
    }

    let mut thumbnail_url = None;
    if let Some(header) = root.pointer("/header/c4TabbedHeaderRenderer") {
        thumbnail_url = last_thumbnail(header.get("avatar"));
        if let Some(name) = header.get("title").and_then(Value::as_str) {
            return Ok(AccountInfo {
                name: name.to_string(),
                email: None,
                thumbnail_url,
            });
        }
    }

    if let Some(name) = text_of(root.get("selectText")) {
        return Ok(AccountInfo {
            name,
            email: None,
            thumbnail_url,
        });
    }

    Err(AuthError::InvalidResponse(
        "could not find account name in response".to_string(),
    ))
}

fn from_contents(contents: Option<&Value>) -> Option<AccountInfo> {
    match contents? {
        // Later entries win, matching how the TV client renders the list.
        Value::Array(items) => items
            .iter()
            .flat_map(|item| {
                let from_section = item
                    .get("accountSectionListRenderer")
                    .and_then(from_section_list);
                let from_renderer = item.get("accountItemRenderer").and_then(from_account_item);
                [from_section, from_renderer]
            })
            .flatten()
            .last(),
        Value::Object(obj) => obj
            .get("accountSectionListRenderer")
            .and_then(from_section_list),
        _ => None,
    }
}

fn from_section_list(section_list: &Value) -> Option<AccountInfo> {
    section_list
        .get("contents")?
        .as_array()?
        .iter()
        .filter_map(|section| section.pointer("/accountItemSectionRenderer/contents"))
        .filter_map(Value::as_array)
        .flatten()
        .find_map(|item| item.get("accountItem"))
        .and_then(from_account_item)
}

fn from_account_item(item: &Value) -> Option<AccountInfo> {
    let name = text_of(item.get("accountName"))?;
    Some(AccountInfo {
        name,
        email: text_of(item.get("accountByline")),
        thumbnail_url: last_thumbnail(item.get("accountPhoto")),
    })
}

/// `simpleText`, or the first entry of `runs`.
fn text_of(value: Option<&Value>) -> Option<String> {
    let value = value?;
    value
        .get("simpleText")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/runs/0/text").and_then(Value::as_str))
        .map(str::to_string)
}

fn last_thumbnail(value: Option<&Value>) -> Option<String> {
    value?
        .get("thumbnails")?
        .as_array()?
        .last()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}
