//! Static mapping from billing-provider product ids to internal plans.

use std::collections::HashMap;

/// Slug used when a product id is not in the catalog.
pub const FALLBACK_PLAN_SLUG: &str = "basic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalogEntry {
    pub display_name: String,
    pub plan_slug: String,
}

impl PlanCatalogEntry {
    pub fn new(display_name: &str, plan_slug: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            plan_slug: plan_slug.to_string(),
        }
    }

    fn fallback() -> Self {
        Self::new("Basic", FALLBACK_PLAN_SLUG)
    }
}

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    entries: HashMap<String, PlanCatalogEntry>,
}

impl PlanCatalog {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, PlanCatalogEntry)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(product_id, entry)| (product_id.into(), entry))
                .collect(),
        }
    }

    /// Lookup that never fails: unknown or missing products resolve to the basic plan.
    pub fn resolve(&self, product_id: Option<&str>) -> PlanCatalogEntry {
        match product_id.and_then(|id| self.entries.get(id)) {
            Some(entry) => entry.clone(),
            None => {
                tracing::warn!(
                    product_id = product_id.unwrap_or(""),
                    fallback = FALLBACK_PLAN_SLUG,
                    "Unknown billing product, falling back to basic plan"
                );
                PlanCatalogEntry::fallback()
            }
        }
    }

    /// Display name for a product, if the catalog knows it.
    pub fn display_name(&self, product_id: Option<&str>) -> Option<String> {
        product_id
            .and_then(|id| self.entries.get(id))
            .map(|e| e.display_name.clone())
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::from_entries([(
            "prod_Tf0tDmMTZeQN1O",
            PlanCatalogEntry::new("Premium", "premium"),
        )])
    }
}
