use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL_ID: &str = "hash-bigram-local-v1";
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;
pub const DEFAULT_NORMALIZATION: &str = "l2";
pub const DEFAULT_BACKEND: &str = "local-hash-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub dimensions: usize,
    pub normalization: String,
    pub backend: String,
}

pub fn default_model_config() -> SemanticModelConfig {
    SemanticModelConfig {
        model_id: DEFAULT_MODEL_ID.to_string(),
        dimensions: DEFAULT_EMBEDDING_DIM,
        normalization: DEFAULT_NORMALIZATION.to_string(),
        backend: DEFAULT_BACKEND.to_string(),
    }
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub fn embedding_text_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_whitespace(payload).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];
    let tokens = tokenize_payload(payload);

    for token in tokens {
        let hash = stable_hash(&token);
        let index = (hash as usize) % dims;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    left.iter()
        .zip(right.iter())
        .map(|(left_value, right_value)| f64::from(*left_value) * f64::from(*right_value))
        .sum::<f64>()
}

pub fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    1.0 - cosine_similarity(left, right)
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    let out = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<f32>>();

    (out.len() == expected_dim).then_some(out)
}

// First 8 bytes of SHA-256, big-endian. Stored vectors depend on this staying fixed.
fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let words = payload
        .split_whitespace()
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>();

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}
