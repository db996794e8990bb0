//! Profile and recent-contribution fetches for admitted users.
//!
//! The two fetches for a key run concurrently and fail independently: a dead
//! profile endpoint still yields the user's contributions, and vice versa.
//! Degraded results stay distinguishable downstream — the profile row keeps
//! its identity columns with everything else empty, contributions are simply
//! absent.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ApiClient, FetchError};
use crate::models::{Contribution, DedupKey, UserInfo};

/// Result of enriching one admitted key. `profile_ok` / `contribs_ok`
/// record which halves actually succeeded.
pub struct EnrichedUser {
    pub info: UserInfo,
    pub contributions: Vec<Contribution>,
    pub profile_ok: bool,
    pub contribs_ok: bool,
}

#[derive(Deserialize, Default)]
struct UsersQuery {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Deserialize)]
struct ApiUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    editcount: Option<u64>,
    #[serde(default)]
    registration: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    blockedby: Option<String>,
    #[serde(default)]
    blockreason: Option<String>,
    #[serde(default)]
    missing: Option<String>,
}

#[derive(Deserialize, Default)]
struct ContribsQuery {
    #[serde(default)]
    usercontribs: Vec<ApiContribution>,
}

#[derive(Deserialize)]
struct ApiContribution {
    revid: u64,
    #[serde(default)]
    pageid: u64,
    #[serde(default)]
    title: String,
    timestamp: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    sizediff: i64,
}

/// Fetches profile metadata and up to `contrib_limit` recent contributions
/// for `key`. Never fails the unit of work: each half degrades on its own.
pub async fn enrich_user(client: &ApiClient, key: &DedupKey, contrib_limit: u32) -> EnrichedUser {
    let (profile, contribs) = tokio::join!(
        fetch_user_info(client, key),
        fetch_contributions(client, key, contrib_limit),
    );

    let (info, profile_ok) = match profile {
        Ok(info) => (info, true),
        Err(e) => {
            warn!(lang = %key.lang, user = %key.user, error = %e, "Profile fetch failed");
            (UserInfo::bare(key), false)
        }
    };

    let (contributions, contribs_ok) = match contribs {
        Ok(list) => (list, true),
        Err(e) => {
            warn!(lang = %key.lang, user = %key.user, error = %e, "Contribution fetch failed");
            (Vec::new(), false)
        }
    };

    EnrichedUser {
        info,
        contributions,
        profile_ok,
        contribs_ok,
    }
}

async fn fetch_user_info(client: &ApiClient, key: &DedupKey) -> Result<UserInfo, FetchError> {
    let params = [
        ("action", "query".to_string()),
        ("list", "users".to_string()),
        ("ususers", key.user.clone()),
        (
            "usprop",
            "blockinfo|editcount|groups|registration".to_string(),
        ),
    ];
    let page = client.get(&key.lang, &params).await?;
    Ok(parse_user_info(key, page.query))
}

fn parse_user_info(key: &DedupKey, query: Value) -> UserInfo {
    let parsed: UsersQuery = serde_json::from_value(query).unwrap_or_default();

    let Some(user) = parsed
        .users
        .into_iter()
        .find(|u| u.missing.is_none() && u.name.is_some())
    else {
        // Anonymous or renamed accounts come back as missing; keep the row
        debug!(lang = %key.lang, user = %key.user, "No registered account for user");
        return UserInfo::bare(key);
    };

    UserInfo {
        lang: key.lang.clone(),
        user: key.user.clone(),
        edit_count: user.editcount,
        registration: user.registration,
        groups: user.groups,
        blocked_by: user.blockedby,
        block_reason: user.blockreason,
    }
}

async fn fetch_contributions(
    client: &ApiClient,
    key: &DedupKey,
    limit: u32,
) -> Result<Vec<Contribution>, FetchError> {
    let params = [
        ("action", "query".to_string()),
        ("list", "usercontribs".to_string()),
        ("ucuser", key.user.clone()),
        (
            "ucprop",
            "ids|title|timestamp|comment|sizediff".to_string(),
        ),
        ("uclimit", limit.min(500).to_string()),
    ];
    let mut pages = client.paginate(&key.lang, &params);

    let mut contributions = Vec::new();
    while contributions.len() < limit as usize {
        let Some(query) = pages.next_page().await? else {
            break;
        };
        let parsed: ContribsQuery = serde_json::from_value(query).unwrap_or_default();
        for c in parsed.usercontribs {
            contributions.push(Contribution {
                lang: key.lang.clone(),
                user: key.user.clone(),
                rev_id: c.revid,
                page_id: c.pageid,
                title: c.title,
                timestamp: c.timestamp,
                comment: c.comment,
                size_diff: c.sizediff,
            });
        }
    }

    contributions.truncate(limit as usize);
    Ok(contributions)
}
