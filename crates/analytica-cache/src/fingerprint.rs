//! Semantic fingerprints: structured summaries of input content used for
//! approximate cache lookup.
//!
//! A fingerprint records the shape of a value rather than its content, so
//! near-identical inputs land close together. Similarity is component-wise:
//! fingerprints of different kinds score 0; within a kind each integer
//! bucket contributes `1 - min(1, |a - b| / scale)`, each boolean 1 or 0,
//! and the components are averaged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const WORD_BUCKET: u32 = 8;
const CHAR_BUCKET: u32 = 64;
const BUCKET_SCALE: f64 = 4.0;
const LENGTH_SCALE: f64 = 8.0;
const KEY_COUNT_SCALE: f64 = 8.0;

/// JSON type histogram for array fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeHistogram {
    pub nulls: u32,
    pub bools: u32,
    pub numbers: u32,
    pub strings: u32,
    pub arrays: u32,
    pub objects: u32,
}

impl TypeHistogram {
    fn total(&self) -> u32 {
        self.nulls + self.bools + self.numbers + self.strings + self.arrays + self.objects
    }

    fn counts(&self) -> [u32; 6] {
        [
            self.nulls,
            self.bools,
            self.numbers,
            self.strings,
            self.arrays,
            self.objects,
        ]
    }
}

/// Primitive kind for scalar fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Null,
    Bool,
    Number,
}

/// Shape summary of a cache key's input content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SemanticFingerprint {
    Text {
        word_bucket: u32,
        char_bucket: u32,
        has_digits: bool,
        has_punct: bool,
    },
    Array {
        length: u32,
        types: TypeHistogram,
    },
    Object {
        key_count: u32,
        sorted_key_hash: u64,
    },
    Scalar {
        kind: ScalarKind,
    },
}

impl SemanticFingerprint {
    /// Discriminator used to bucket the namespace-local index.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            SemanticFingerprint::Text { .. } => "text",
            SemanticFingerprint::Array { .. } => "array",
            SemanticFingerprint::Object { .. } => "object",
            SemanticFingerprint::Scalar { .. } => "scalar",
        }
    }

    pub fn for_text(text: &str) -> Self {
        SemanticFingerprint::Text {
            word_bucket: text.split_whitespace().count() as u32 / WORD_BUCKET,
            char_bucket: text.chars().count() as u32 / CHAR_BUCKET,
            has_digits: text.chars().any(|c| c.is_ascii_digit()),
            has_punct: text.chars().any(|c| c.is_ascii_punctuation()),
        }
    }

    /// Fingerprints any JSON value by its shape.
    pub fn for_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::for_text(s),
            Value::Array(items) => {
                let mut types = TypeHistogram::default();
                for item in items {
                    match item {
                        Value::Null => types.nulls += 1,
                        Value::Bool(_) => types.bools += 1,
                        Value::Number(_) => types.numbers += 1,
                        Value::String(_) => types.strings += 1,
                        Value::Array(_) => types.arrays += 1,
                        Value::Object(_) => types.objects += 1,
                    }
                }
                SemanticFingerprint::Array {
                    length: items.len() as u32,
                    types,
                }
            }
            Value::Object(map) => {
                // Keys in a serde_json map iterate in sorted order only for
                // BTreeMap backends; sort explicitly so equivalent objects
                // hash identically.
                let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
                keys.sort_unstable();
                let mut hasher = Sha256::new();
                for key in &keys {
                    hasher.update(key.as_bytes());
                    hasher.update([0u8]);
                }
                let digest = hasher.finalize();
                let mut first8 = [0u8; 8];
                first8.copy_from_slice(&digest[..8]);
                SemanticFingerprint::Object {
                    key_count: map.len() as u32,
                    sorted_key_hash: u64::from_be_bytes(first8),
                }
            }
            Value::Null => SemanticFingerprint::Scalar { kind: ScalarKind::Null },
            Value::Bool(_) => SemanticFingerprint::Scalar { kind: ScalarKind::Bool },
            Value::Number(_) => SemanticFingerprint::Scalar { kind: ScalarKind::Number },
        }
    }

    /// Component-wise similarity in `[0, 1]`. Different kinds score 0.
    pub fn similarity(&self, other: &SemanticFingerprint) -> f64 {
        match (self, other) {
            (
                SemanticFingerprint::Text {
                    word_bucket: aw,
                    char_bucket: ac,
                    has_digits: ad,
                    has_punct: ap,
                },
                SemanticFingerprint::Text {
                    word_bucket: bw,
                    char_bucket: bc,
                    has_digits: bd,
                    has_punct: bp,
                },
            ) => average(&[
                bucket_sim(*aw, *bw, BUCKET_SCALE),
                bucket_sim(*ac, *bc, BUCKET_SCALE),
                bool_sim(*ad, *bd),
                bool_sim(*ap, *bp),
            ]),
            (
                SemanticFingerprint::Array { length: al, types: at },
                SemanticFingerprint::Array { length: bl, types: bt },
            ) => {
                let scale = at.total().max(bt.total()).max(1) as f64;
                let mut components = vec![bucket_sim(*al, *bl, LENGTH_SCALE)];
                for (a, b) in at.counts().iter().zip(bt.counts().iter()) {
                    components.push(bucket_sim(*a, *b, scale));
                }
                average(&components)
            }
            (
                SemanticFingerprint::Object {
                    key_count: ak,
                    sorted_key_hash: ah,
                },
                SemanticFingerprint::Object {
                    key_count: bk,
                    sorted_key_hash: bh,
                },
            ) => average(&[
                bucket_sim(*ak, *bk, KEY_COUNT_SCALE),
                if ah == bh { 1.0 } else { 0.0 },
            ]),
            (
                SemanticFingerprint::Scalar { kind: a },
                SemanticFingerprint::Scalar { kind: b },
            ) => {
                if a == b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

fn bucket_sim(a: u32, b: u32, scale: f64) -> f64 {
    let diff = (a as f64 - b as f64).abs();
    1.0 - (diff / scale).min(1.0)
}

fn bool_sim(a: bool, b: bool) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

fn average(components: &[f64]) -> f64 {
    if components.is_empty() {
        return 0.0;
    }
    components.iter().sum::<f64>() / components.len() as f64
}
