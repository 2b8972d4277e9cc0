//! Fan-out resolution — which languages does a message need?
//!
//! A pure function over a snapshot of member language preferences taken at
//! translation time.  Preference changes made after a message is translated
//! affect only future messages.

use std::collections::BTreeSet;

use crate::lang::Language;

/// The distinct primary languages of the channel's members, minus the
/// message's source language, in a deterministic order.
///
/// For a DM thread the membership snapshot is simply the two participants.
pub fn resolve_targets(
    member_languages: impl IntoIterator<Item = Language>,
    source: Language,
) -> Vec<Language> {
    let mut targets: BTreeSet<Language> = member_languages.into_iter().collect();
    targets.remove(&source);
    targets.into_iter().collect()
}
