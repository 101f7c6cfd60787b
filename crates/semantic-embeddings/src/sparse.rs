use std::collections::{HashMap, HashSet};

/// Collapse per-token weights into lexical weights keyed by token id.
///
/// Special tokens and non-positive weights are dropped. A token occurring more
/// than once keeps its highest weight. Keys are decimal token ids, matching the
/// layout BGE-M3 uses for `lexical_weights`.
pub fn lexical_weights(
    token_ids: &[u32],
    weights: &[f32],
    special_ids: &HashSet<u32>,
) -> HashMap<String, f32> {
    let mut out: HashMap<String, f32> = HashMap::new();

    for (&id, &weight) in token_ids.iter().zip(weights) {
        if special_ids.contains(&id) || weight <= 0.0 {
            continue;
        }
        let entry = out.entry(id.to_string()).or_insert(weight);
        if weight > *entry {
            *entry = weight;
        }
    }

    out
}
