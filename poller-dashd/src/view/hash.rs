use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::{RegistrySnapshot, ServiceId, ServiceStatus};

#[derive(Serialize)]
struct HashView<'a> {
    id: ServiceId,
    name: &'a str,
    url: &'a str,
    created_at: i64,
    current_status: ServiceStatus,
}

/// Computes a SHA-256 fingerprint of the merged snapshot.
/// Services are sorted by id for deterministic output.
pub fn compute_hash(snapshot: &RegistrySnapshot) -> String {
    let mut indices: Vec<usize> = (0..snapshot.services.len()).collect();
    indices.sort_by_key(|&i| snapshot.services[i].id);

    let views: Vec<HashView<'_>> = indices
        .iter()
        .map(|&i| {
            let s = &snapshot.services[i];
            HashView {
                id: s.id,
                name: &s.name,
                url: &s.url,
                created_at: s.created_at.timestamp_millis(),
                current_status: s.current_status,
            }
        })
        .collect();

    let json = serde_json::to_string(&views)
        .expect("Failed to serialize snapshot for hashing");

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}
