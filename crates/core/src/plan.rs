use crate::address::ServerTier;
use crate::engine::EngineCall;
use crate::lease::Resource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Printed on its own line before the call runs.
    pub heading: Option<&'static str>,
    pub call: EngineCall,
}

/// Ordered engine calls for one operation. Steps run sequentially and the
/// first failure stops the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn single(call: EngineCall) -> Self {
        Self {
            steps: vec![Step {
                heading: None,
                call,
            }],
        }
    }

    /// Expands a tiered operation. `All` runs local first, then remote.
    pub fn for_tier(
        tier: ServerTier,
        local: EngineCall,
        remote: EngineCall,
        headings: Option<(&'static str, &'static str)>,
    ) -> Self {
        match tier {
            ServerTier::Local => Self::single(local),
            ServerTier::Remote => Self::single(remote),
            ServerTier::All => Self {
                steps: vec![
                    Step {
                        heading: headings.map(|(local, _)| local),
                        call: local,
                    },
                    Step {
                        heading: headings.map(|(_, remote)| remote),
                        call: remote,
                    },
                ],
            },
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn calls(&self) -> impl Iterator<Item = &EngineCall> {
        self.steps.iter().map(|s| &s.call)
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.calls().flat_map(EngineCall::resources).collect()
    }

    pub fn needs_clean_shadow(&self) -> bool {
        self.calls().any(EngineCall::needs_clean_shadow)
    }
}
