//! Strategy selection by name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::StrategyContext;
use crate::error::StrategyError;
use crate::strategy::ReindexStrategy;
use crate::variants::{BaselineStrategy, BlueGreenStrategy, LockingStrategy, SoftDeleteStrategy};

/// The closed set of strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Baseline,
    BlueGreen,
    SoftDelete,
    Locking,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Baseline,
        StrategyKind::BlueGreen,
        StrategyKind::SoftDelete,
        StrategyKind::Locking,
    ];

    pub fn all() -> &'static [StrategyKind] {
        &Self::ALL
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Baseline => "baseline",
            StrategyKind::BlueGreen => "blue-green",
            StrategyKind::SoftDelete => "soft-delete",
            StrategyKind::Locking => "locking",
        }
    }

    /// Comma-separated names, for error messages and help text.
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(StrategyKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| StrategyError::UnknownStrategy {
                name: s.to_string(),
                available: Self::available(),
            })
    }
}

/// Construct the strategy for `kind` over `ctx`.
pub fn build_strategy(kind: StrategyKind, ctx: StrategyContext) -> Arc<dyn ReindexStrategy> {
    match kind {
        StrategyKind::Baseline => Arc::new(BaselineStrategy::new(ctx)),
        StrategyKind::BlueGreen => Arc::new(BlueGreenStrategy::new(ctx)),
        StrategyKind::SoftDelete => Arc::new(SoftDeleteStrategy::new(ctx)),
        StrategyKind::Locking => Arc::new(LockingStrategy::new(ctx)),
    }
}

/// Look up a strategy by name.
pub fn strategy_by_name(
    name: &str,
    ctx: StrategyContext,
) -> Result<Arc<dyn ReindexStrategy>, StrategyError> {
    Ok(build_strategy(name.parse()?, ctx))
}
