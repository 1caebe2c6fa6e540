//! Validation of replication-relevant queue settings.
//!
//! The alias translation from legacy `x-qpid-*` spellings to the canonical
//! `qpid.*` keys (spec.md §6) is the out-of-scope queue-settings parser's
//! job — by the time a [`Descriptor`] reaches this module, its argument
//! bag already uses canonical keys. What this core is responsible for is
//! rejecting combinations of those canonical settings that cannot be
//! satisfied together.

use crate::error::HaError;
use crate::types::{arg_keys, ArgumentBag};

/// Checks a queue's argument bag for contradictory settings:
///
/// - a last-value queue combined with priority levels (LVQ collapses to one
///   message per key, which priority ordering cannot coexist with)
/// - fairshare scheduling without priority levels (fairshare partitions
///   credit across priority bands; without priorities there is nothing to
///   partition)
pub fn validate(args: &ArgumentBag) -> Result<(), HaError> {
    let lvq = args.get_bool(arg_keys::LAST_VALUE_QUEUE).unwrap_or(false);
    let priorities = args.get_int(arg_keys::PRIORITIES);
    let fairshare = args.get_int(arg_keys::FAIRSHARE);

    if lvq && priorities.is_some() {
        return Err(HaError::ContradictoryQueueSettings(
            "last-value-queue cannot be combined with priority levels".to_string(),
        ));
    }

    if fairshare.is_some() && priorities.is_none() {
        return Err(HaError::ContradictoryQueueSettings(
            "fairshare scheduling requires priority levels".to_string(),
        ));
    }

    Ok(())
}
