//! Channel registry with legacy type-key normalization.
//!
//! Older subscription rows carry historical spellings of channel type keys.
//! The alias table maps those to canonical keys once, at lookup time, instead
//! of special-casing spellings inside the dispatch loop.

use std::collections::HashMap;

use crate::channel::Notifier;

/// Canonical key → tolerated legacy spellings.
const ALIASES: &[(&str, &[&str])] = &[
  ("webhook", &["web-hook", "http", "https"]),
  ("chat-bot", &["chatbot", "bot", "telegram"]),
];

/// Normalize a (possibly legacy) channel type key to its canonical form.
/// Unrecognized keys pass through unchanged so the lookup failure is reported
/// with the original spelling.
pub fn canonical_type_key(raw: &str) -> &str {
  let key = raw.trim();
  for (canonical, aliases) in ALIASES {
    if key.eq_ignore_ascii_case(canonical)
      || aliases.iter().any(|a| key.eq_ignore_ascii_case(a))
    {
      return canonical;
    }
  }
  key
}

/// Holds one [`Notifier`] per canonical channel type key.
#[derive(Default)]
pub struct NotifierRegistry {
  channels: HashMap<&'static str, Box<dyn Notifier>>,
}

impl NotifierRegistry {
  pub fn new() -> Self { Self::default() }

  /// Register a channel under its own type key, replacing any previous
  /// registration for that key.
  pub fn register(&mut self, notifier: Box<dyn Notifier>) {
    self.channels.insert(notifier.type_key(), notifier);
  }

  /// Resolve a subscription's channel type, tolerating legacy spellings.
  pub fn get(&self, type_key: &str) -> Option<&dyn Notifier> {
    self
      .channels
      .get(canonical_type_key(type_key))
      .map(Box::as_ref)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
