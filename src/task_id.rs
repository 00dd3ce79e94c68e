use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix that marks an id as client-generated and not yet known to the
/// server. Server ids never carry it, so the two keyspaces cannot collide.
pub const CLIENT_ID_PREFIX: &str = "c-";

/// Generates a temporary client id for a task created offline. The id must
/// stay unique within one store; `exists` probes the store for collisions.
pub fn generate_client_id<F>(mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    for _ in 0..64 {
        let seed = Uuid::now_v7().to_string();
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let candidate = format!("{}{}", CLIENT_ID_PREFIX, &digest[..8]);
        if !exists(&candidate) {
            return candidate;
        }
    }

    format!(
        "{}{}",
        CLIENT_ID_PREFIX,
        &Uuid::now_v7().simple().to_string()[..12]
    )
}

/// Queue-unique id for one outbox entry. UUIDv7 keeps these time-ordered,
/// which makes same-timestamp ties in the queue resolve in insertion order.
pub fn new_op_id() -> String {
    format!("op-{}", Uuid::now_v7())
}

pub fn is_client_id(id: &str) -> bool {
    id.starts_with(CLIENT_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{generate_client_id, is_client_id, new_op_id};

    #[test]
    fn client_ids_carry_prefix_and_short_hash() {
        let seen: HashSet<String> = HashSet::new();
        let id = generate_client_id(|candidate| seen.contains(candidate));
        assert!(id.starts_with("c-"));
        assert_eq!(id.len(), "c-".len() + 8);
    }

    #[test]
    fn collision_probe_forces_a_fresh_candidate() {
        let mut rejected_first = false;
        let id = generate_client_id(|_| {
            if rejected_first {
                false
            } else {
                rejected_first = true;
                true
            }
        });
        assert!(rejected_first);
        assert!(id.starts_with("c-"));
    }

    #[test]
    fn op_ids_are_unique_and_sortable() {
        let a = new_op_id();
        let b = new_op_id();
        assert_ne!(a, b);
        assert!(a.starts_with("op-"));
        assert!(a < b, "v7 op ids should order by creation time");
    }

    #[test]
    fn server_ids_are_not_client_ids() {
        assert!(is_client_id("c-1a2b3c4d"));
        assert!(!is_client_id("65f0c2aa9d1e"));
    }
}
