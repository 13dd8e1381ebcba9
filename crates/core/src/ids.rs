use std::collections::VecDeque;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, warn};

use crate::domain::meta::{BusinessId, EntityKind};
use crate::errors::ApplicationError;
use crate::store::BusinessIdLookup;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Draws the numeric part of a business id.
pub trait SuffixSource: Send {
    fn next_suffix(&mut self, digits: usize) -> String;
}

pub struct RandomSuffix {
    rng: StdRng,
}

impl RandomSuffix {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for RandomSuffix {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl SuffixSource for RandomSuffix {
    fn next_suffix(&mut self, digits: usize) -> String {
        (0..digits).map(|_| char::from(b'0' + self.rng.gen_range(0..10u8))).collect()
    }
}

/// Replays fixed suffixes in order, then falls back to seeded random draws.
pub struct ScriptedSuffix {
    script: VecDeque<String>,
    fallback: RandomSuffix,
}

impl ScriptedSuffix {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: script.into_iter().map(Into::into).collect(),
            fallback: RandomSuffix::seeded(7),
        }
    }
}

impl SuffixSource for ScriptedSuffix {
    fn next_suffix(&mut self, digits: usize) -> String {
        self.script.pop_front().unwrap_or_else(|| self.fallback.next_suffix(digits))
    }
}

/// Attempts left for one id assignment, shared between the existence check and the insert retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdBudget {
    max: u32,
    used: u32,
}

impl IdBudget {
    pub fn new(max: u32) -> Self {
        Self { max: max.max(1), used: 0 }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    fn spend(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }
}

pub struct IdGenerator {
    source: Mutex<Box<dyn SuffixSource>>,
    max_attempts: u32,
}

impl IdGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_source(RandomSuffix::from_entropy(), max_attempts)
    }

    pub fn with_source(source: impl SuffixSource + 'static, max_attempts: u32) -> Self {
        Self { source: Mutex::new(Box::new(source)), max_attempts: max_attempts.max(1) }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn budget(&self) -> IdBudget {
        IdBudget::new(self.max_attempts)
    }

    pub fn candidate(&self, kind: EntityKind) -> BusinessId {
        let suffix = match self.source.lock() {
            Ok(mut source) => source.next_suffix(kind.business_id_digits()),
            Err(poisoned) => poisoned.into_inner().next_suffix(kind.business_id_digits()),
        };
        BusinessId(format!("{}{suffix}", kind.business_id_prefix()))
    }

    pub async fn generate<L>(&self, kind: EntityKind, lookup: &L) -> Result<BusinessId, ApplicationError>
    where
        L: BusinessIdLookup + ?Sized,
    {
        let mut budget = self.budget();
        self.generate_within(kind, lookup, &mut budget).await
    }

    /// Draws candidates until one is free in `kind`'s collection or `budget` runs out.
    pub async fn generate_within<L>(
        &self,
        kind: EntityKind,
        lookup: &L,
        budget: &mut IdBudget,
    ) -> Result<BusinessId, ApplicationError>
    where
        L: BusinessIdLookup + ?Sized,
    {
        while budget.spend() {
            let candidate = self.candidate(kind);
            if !lookup.business_id_exists(kind, &candidate.0).await? {
                return Ok(candidate);
            }
            warn!(
                event_name = "ids.collision",
                entity_kind = kind.as_str(),
                candidate = %candidate,
                attempt = budget.used(),
                "business id collision, drawing a new suffix"
            );
        }

        error!(
            event_name = "ids.exhausted",
            entity_kind = kind.as_str(),
            attempts = budget.used(),
            "business id generation exhausted"
        );
        Err(ApplicationError::GenerationExhausted {
            kind,
            prefix: kind.business_id_prefix().to_string(),
            attempts: budget.used(),
        })
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}
