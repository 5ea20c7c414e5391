//! Deterministic stand-ins for the embedding and answer services.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{AnswerService, EmbeddingProvider, Result, l2_normalize};

pub const DIM: usize = 64;

/// Hashes each lower-cased word into one of `DIM` buckets and unit-normalizes
/// the counts. Texts with disjoint vocabularies are orthogonal; a text and
/// any excerpt of it point in similar directions.
pub struct BagOfWordsEmbedder {
    model: String,
    normalize: bool,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self { model: "bag-of-words".to_string(), normalize: true }
    }

    pub fn named(model: &str) -> Self {
        Self { model: model.to_string(), normalize: true }
    }

    /// Claims normalized output but returns raw counts.
    pub fn misreporting() -> Self {
        Self { model: "bag-of-words".to_string(), normalize: false }
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a, stable across runs.
    let hash = word
        .bytes()
        .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
    (hash % DIM as u64) as usize
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        v[bucket(&word.to_lowercase())] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = bag_of_words(text);
        if self.normalize {
            l2_normalize(&mut v);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn normalized(&self) -> bool {
        true
    }
}

/// Returns a fixed completion and records every prompt it receives.
pub struct ScriptedAnswerService {
    reply: String,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedAnswerService {
    pub fn replying(reply: &str) -> Self {
        Self { reply: reply.to_string(), delay: None, prompts: Mutex::new(Vec::new()) }
    }

    /// Waits `delay` before replying.
    pub fn slow(delay: Duration) -> Self {
        Self { reply: String::new(), delay: Some(delay), prompts: Mutex::new(Vec::new()) }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AnswerService for ScriptedAnswerService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
