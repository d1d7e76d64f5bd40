//! Alternate-account detection
//!
//! First-degree alternates are accounts whose identifying tokens intersect
//! this user's login history. Second-degree alternates are assembled from the
//! neighbors' own first-degree maps at refresh time, never traversed at
//! query time.

use crate::error::Result;
use crate::history::login::{
    is_ignored_login_value, LoginHistory, LOGIN_HISTORY_CACHE_INDEX,
};
use crate::store::{AccountProvider, StorageClient};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Page size for index listings
const SEARCH_PAGE_LIMIT: usize = 100;

/// Evidence linking two accounts: the identifying tokens they share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternateSearchMatch {
    pub user_id: String,
    pub items: Vec<String>,
}

/// Escape regex metacharacters so a token searches as a literal.
fn escape_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(
            c,
            '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\' | '/'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Regex search over the login-history cache index.
///
/// Pages through the index until the cursor is exhausted; returned records
/// carry their storage version fences.
pub async fn login_history_regex_search(
    store: &dyn StorageClient,
    pattern: &str,
    limit: usize,
) -> Result<HashMap<String, LoginHistory>> {
    let query = format!("+value.cache:/{}/", pattern);

    let mut histories = HashMap::new();
    let mut cursor = String::new();
    loop {
        let page = store
            .index_list(LOGIN_HISTORY_CACHE_INDEX, &query, limit, &cursor)
            .await?;

        for object in page.objects {
            let mut history: LoginHistory = serde_json::from_str(&object.value)?;
            history.set_storage_version(object.user_id.clone(), object.version);
            histories.insert(object.user_id, history);
        }

        if page.cursor.is_empty() {
            break;
        }
        cursor = page.cursor;
    }
    Ok(histories)
}

/// Find accounts sharing identifying tokens with this history.
///
/// Returns one match per foreign user id along with that user's record, so
/// callers can reach second-degree links without re-querying.
pub async fn login_alternate_search(
    store: &dyn StorageClient,
    history: &LoginHistory,
) -> Result<Vec<(AlternateSearchMatch, LoginHistory)>> {
    let own_items: BTreeSet<String> = history
        .history
        .values()
        .flat_map(|entry| entry.items())
        .filter(|item| !is_ignored_login_value(item))
        .collect();

    let mut found: HashMap<String, (AlternateSearchMatch, LoginHistory)> = HashMap::new();

    for item in &own_items {
        let pattern = escape_pattern(item);
        let results =
            login_history_regex_search(store, &pattern, SEARCH_PAGE_LIMIT).await?;

        for (user_id, other) in results {
            if user_id == history.user_id() {
                continue;
            }

            let shared: Vec<String> = other
                .cache
                .iter()
                .filter(|token| own_items.contains(*token))
                .cloned()
                .collect();
            if shared.is_empty() {
                continue;
            }

            match found.get_mut(&user_id) {
                Some((existing, _)) => {
                    for token in shared {
                        if !existing.items.contains(&token) {
                            existing.items.push(token);
                        }
                    }
                }
                None => {
                    found.insert(
                        user_id.clone(),
                        (
                            AlternateSearchMatch {
                                user_id,
                                items: shared,
                            },
                            other,
                        ),
                    );
                }
            }
        }
    }

    let mut matches: Vec<_> = found.into_values().collect();
    matches.sort_by(|a, b| a.0.user_id.cmp(&b.0.user_id));
    Ok(matches)
}

impl LoginHistory {
    /// Refresh first- and second-degree alternate links.
    ///
    /// Returns whether any matched account carries a disable time, unless the
    /// record's `ignore_disabled_alternates` policy suppresses the check.
    /// `exclude_user_ids` are omitted from the disabled-account lookup.
    pub async fn update_alternates(
        &mut self,
        store: &dyn StorageClient,
        accounts: &dyn AccountProvider,
        exclude_user_ids: &[String],
    ) -> Result<bool> {
        let matches = login_alternate_search(store, self).await?;

        let mut user_ids: Vec<String> = matches
            .iter()
            .map(|(m, _)| m.user_id.clone())
            .filter(|id| !exclude_user_ids.contains(id))
            .collect();
        user_ids.sort();
        user_ids.dedup();

        let mut has_disabled_alts = false;
        if !self.ignore_disabled_alternates {
            for account in accounts.accounts_get_ids(&user_ids).await? {
                if account.disable_time.is_some() {
                    has_disabled_alts = true;
                }
            }
        }

        self.alternate_map = HashMap::with_capacity(matches.len());
        let mut second_degree: HashSet<String> = HashSet::new();
        for (search_match, other) in matches {
            // One alternate hop: the neighbor's own first-degree links.
            second_degree.extend(other.alternate_map.keys().cloned());
            self.alternate_map
                .entry(search_match.user_id.clone())
                .or_default()
                .push(search_match);
        }

        let own_user_id = self.user_id().to_string();
        self.second_degree_alternates = second_degree
            .into_iter()
            .filter(|id| *id != own_user_id && !self.alternate_map.contains_key(id))
            .collect();
        self.second_degree_alternates.sort();
        self.second_degree_alternates.dedup();

        Ok(has_disabled_alts)
    }
}
