//! A named collection: its candidate data sources, authorized roles, and
//! fairness limits (§3, §4.6).

use std::collections::HashMap;

use crate::coercion::{self, CoercionConfig};
use crate::datasource::{create_datasource, DataSource, DataSourceConfig, MatchOutcome};
use crate::error::Result;
use crate::request::{RequestData, Verb};
use crate::user::User;

/// `{total?, per-user?, per-role?: {realm: {role: int}}}` (§6's configuration
/// surface), consumed by the broker's quota evaluation (§4.4.1).
#[derive(Debug, Clone, Default)]
pub struct CollectionLimits {
    pub total: Option<usize>,
    pub per_user: Option<usize>,
    pub per_role: HashMap<String, HashMap<String, usize>>,
}

impl CollectionLimits {
    /// The maximum of the role-specific limits in `per_role[realm]` across
    /// `roles`, falling back to `per_user` if no role matches and it's positive,
    /// otherwise `None` (no per-user cap applies) — §4.4.1's precedence rule.
    pub fn per_user_cap(&self, realm: &str, roles: &[String]) -> Option<usize> {
        let role_limits = self.per_role.get(realm);
        let role_max = role_limits.and_then(|limits| {
            roles.iter().filter_map(|role| limits.get(role)).max().copied()
        });
        role_max.or(self.per_user.filter(|&cap| cap > 0))
    }
}

/// An ordered list of candidate data sources plus the realm/role access list and
/// fairness limits for one logical collection.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub datasources: Vec<DataSourceConfig>,
    pub roles: HashMap<String, Vec<String>>,
    pub limits: CollectionLimits,
    pub coercion: CoercionConfig,
}

impl Collection {
    /// Whether `user` carries one of the roles authorized for this collection in
    /// their realm. Consumed by the frontend before it ever creates a request
    /// against this collection (§1 excludes the frontend itself).
    pub fn is_authorized(&self, user: &User) -> bool {
        self.roles
            .get(user.realm())
            .is_some_and(|allowed| allowed.iter().any(|role| user.roles.contains(role)))
    }

    /// Walks the ordered data-source list (§4.5.1 steps 1-4): the first source
    /// that matches AND succeeds wins. Every attempt's trace — mismatches and
    /// matched-but-failed alike — is appended to `request.user_message`, not just
    /// the winner's (§10.5). Returns the winning data source (still holding its
    /// result, for the caller to stream into staging) or `None` if nothing
    /// succeeded.
    pub async fn dispatch(
        &self,
        request: &mut RequestData,
        input: Option<&[u8]>,
    ) -> Result<Option<Box<dyn DataSource>>> {
        let coerced = coercion::coerce(&self.coercion, &request.user_request)?;
        let mut any_matched = false;

        for cfg in &self.datasources {
            let data_source = create_datasource(cfg)?;
            match data_source.matches(request, &coerced).await? {
                MatchOutcome::Mismatch(reason) => {
                    request.append_message(format!("{}: {reason}", cfg.kind));
                    continue;
                }
                MatchOutcome::Matched => {}
            }

            any_matched = true;
            let outcome = data_source.dispatch(request, input).await?;
            request.append_message(format!("{}: {}", cfg.kind, outcome.trace));

            if outcome.succeeded {
                return Ok(Some(data_source));
            }
            data_source.destroy().await?;
        }

        if !any_matched {
            request.append_message("no data source matched this request");
        }
        Ok(None)
    }
}

/// Guards a collection-scoped verb against the caller's role membership; used
/// wherever request creation needs a single yes/no without duplicating the
/// `is_authorized` lookup.
pub fn authorized_verb(collection: &Collection, user: &User, _verb: Verb) -> bool {
    collection.is_authorized(user)
}
