//! Protocol contracts between questions and the apps that answer them.

use std::collections::BTreeSet;

/// Protocols in `required` that `provided` does not declare.
///
/// An empty result means the candidate app satisfies the question.
pub fn unsatisfied_protocols(required: &[String], provided: &[String]) -> BTreeSet<String> {
    let provided: BTreeSet<&str> = provided.iter().map(String::as_str).collect();
    required
        .iter()
        .filter(|protocol| !provided.contains(protocol.as_str()))
        .cloned()
        .collect()
}
