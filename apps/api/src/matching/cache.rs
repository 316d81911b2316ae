//! Result Cache — process-lifetime store of match results keyed by the exact
//! (resume text, job description) pair.
//!
//! No normalization and no eviction: texts differing only in whitespace are
//! distinct keys, and entries live until the process exits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::matching::MatchResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    resume_text: String,
    job_description: String,
}

impl CacheKey {
    fn new(resume_text: &str, job_description: &str) -> Self {
        Self {
            resume_text: resume_text.to_string(),
            job_description: job_description.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<CacheKey, Arc<MatchResult>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resume_text: &str, job_description: &str) -> Option<Arc<MatchResult>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&CacheKey::new(resume_text, job_description))
            .cloned()
    }

    /// Stores `result` unless the key is already present. Entries are never
    /// replaced, so the returned value is whichever result was stored first.
    pub fn set(
        &self,
        resume_text: &str,
        job_description: &str,
        result: MatchResult,
    ) -> Arc<MatchResult> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(CacheKey::new(resume_text, job_description))
            .or_insert_with(|| Arc::new(result))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(percentage: u8) -> MatchResult {
        MatchResult {
            match_percentage: percentage,
            matched_skills: vec!["Rust".to_string()],
            missing_skills: vec![],
            suggestions: vec![],
            explanation: "ok".to_string(),
            model_used: "phi".to_string(),
            raw_response: None,
        }
    }

    #[test]
    fn test_get_after_set_returns_same_object() {
        let cache = ResultCache::new();
        let stored = cache.set("resume", "jd", result(70));
        let hit = cache.get("resume", "jd").unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn test_miss_on_unknown_pair() {
        let cache = ResultCache::new();
        cache.set("resume", "jd", result(70));
        assert!(cache.get("resume", "other jd").is_none());
        assert!(cache.get("other resume", "jd").is_none());
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = ResultCache::new();
        assert!(cache.is_empty());
        cache.set("resume", "jd", result(70));
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_whitespace_is_significant() {
        let cache = ResultCache::new();
        cache.set("resume", "jd", result(70));
        assert!(cache.get("resume ", "jd").is_none());
        assert!(cache.get("Resume", "jd").is_none());
    }

    #[test]
    fn test_pair_boundary_is_not_ambiguous() {
        // A naive concatenated key would collide here.
        let cache = ResultCache::new();
        cache.set("ab", "c", result(10));
        assert!(cache.get("a", "bc").is_none());
    }

    #[test]
    fn test_first_write_wins() {
        let cache = ResultCache::new();
        cache.set("resume", "jd", result(70));
        let kept = cache.set("resume", "jd", result(20));
        assert_eq!(kept.match_percentage, 70);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_are_safe() {
        let cache = Arc::new(ResultCache::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.set(&format!("resume-{i}"), "jd", result(i));
                    cache.get(&format!("resume-{i}"), "jd").unwrap()
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
