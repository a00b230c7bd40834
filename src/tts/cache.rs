//! Модуль для кэширования результатов TTS
//!
//! `CachingSynthesizer` оборачивает любой синтезатор: результаты хранятся
//! в памяти и, если задана директория, в WAV-файлах на диске. Ключ кэша:
//! md5 от текста, языка и голоса.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use crate::config::CacheConfig;
use crate::error::{Result, SynthesisError};
use crate::media::wav;
use crate::tts::{SynthesisResult, Synthesizer};

/// Кэш WAV-файлов на диске с ограничением размера
struct DiskCache {
    dir: PathBuf,
    max_size: Option<u64>,
}

impl DiskCache {
    fn new(dir: PathBuf, max_size: Option<u64>) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir, max_size })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", key))
    }

    fn load(&self, key: &str) -> Option<SynthesisResult> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match wav::read_wav(&path) {
            Ok(clip) => Some(SynthesisResult::new(clip)),
            Err(e) => {
                warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn store(&self, key: &str, result: &SynthesisResult) -> Result<()> {
        wav::write_wav(self.path_for(key), &result.clip)?;
        self.check_cache_size()
    }

    fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_cache_file(&entry.path()) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Удалить старые файлы, если размер кэша превышает максимальный
    fn check_cache_size(&self) -> Result<()> {
        let Some(max_size) = self.max_size else {
            return Ok(());
        };

        let mut total_size = 0;
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_cache_file(&entry.path()) {
                let metadata = entry.metadata()?;
                total_size += metadata.len();
                files.push((entry.path(), metadata.modified()?, metadata.len()));
            }
        }

        if total_size <= max_size {
            return Ok(());
        }

        // От старых к новым
        files.sort_by(|a, b| a.1.cmp(&b.1));
        for (path, _, len) in files {
            if total_size <= max_size {
                break;
            }
            debug!("Evicting cache file {}", path.display());
            fs::remove_file(&path)?;
            total_size -= len;
        }
        Ok(())
    }
}

fn is_cache_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("wav")
}

/// Кэш клипов в памяти; при превышении размера удаляются самые старые
#[derive(Default)]
struct MemoryCache {
    entries: HashMap<String, SynthesisResult>,
    order: VecDeque<String>,
    total_size: u64,
    max_size: Option<u64>,
}

impl MemoryCache {
    fn new(max_size: Option<u64>) -> Self {
        Self { max_size, ..Self::default() }
    }

    fn get(&self, key: &str) -> Option<SynthesisResult> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, result: SynthesisResult) {
        self.total_size += clip_size(&result);
        if let Some(previous) = self.entries.insert(key.clone(), result) {
            self.total_size -= clip_size(&previous);
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
        self.check_cache_size();
    }

    fn check_cache_size(&mut self) {
        let Some(max_size) = self.max_size else {
            return;
        };
        while self.total_size > max_size {
            let Some(oldest) = self.order.pop_front() else { break };
            if let Some(evicted) = self.entries.remove(&oldest) {
                debug!("Evicting cached clip {} from memory", oldest);
                self.total_size -= clip_size(&evicted);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_size = 0;
    }
}

/// Объем семплов клипа в байтах
fn clip_size(result: &SynthesisResult) -> u64 {
    (result.clip.samples.len() * std::mem::size_of::<f32>()) as u64
}

/// Синтезатор с кэшированием результатов
pub struct CachingSynthesizer<S> {
    inner: S,
    memory: Mutex<MemoryCache>,
    disk: Option<DiskCache>,
}

impl<S: Synthesizer> CachingSynthesizer<S> {
    /// Кэш только в памяти, без ограничения размера
    pub fn new(inner: S) -> Self {
        Self::with_memory_limit(inner, None)
    }

    /// Кэш только в памяти не больше `max_size` байт семплов
    pub fn with_memory_limit(inner: S, max_size: Option<u64>) -> Self {
        Self { inner, memory: Mutex::new(MemoryCache::new(max_size)), disk: None }
    }

    /// Кэш в памяти и на диске в `dir`; `max_size` действует на оба уровня
    pub fn with_disk<P: AsRef<Path>>(inner: S, dir: P, max_size: Option<u64>) -> Result<Self> {
        let disk = DiskCache::new(dir.as_ref().to_path_buf(), max_size)?;
        info!("Using TTS disk cache at {}", dir.as_ref().display());
        Ok(Self {
            inner,
            memory: Mutex::new(MemoryCache::new(max_size)),
            disk: Some(disk),
        })
    }

    /// Построить по настройкам кэша
    pub fn from_config(inner: S, config: &CacheConfig) -> Result<Self> {
        match &config.dir {
            Some(dir) => Self::with_disk(inner, dir, config.max_size_bytes),
            None => Ok(Self::with_memory_limit(inner, config.max_size_bytes)),
        }
    }

    /// Количество записей в памяти
    pub fn len(&self) -> usize {
        self.memory.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.lock().entries.is_empty()
    }

    /// Объем клипов в памяти, байт
    pub fn memory_size(&self) -> u64 {
        self.memory.lock().total_size
    }

    /// Очистить кэш в памяти и на диске
    pub fn clear(&self) -> Result<()> {
        self.memory.lock().clear();
        if let Some(disk) = &self.disk {
            disk.clear()?;
        }
        Ok(())
    }
}

/// Ключ кэша для запроса
pub fn cache_key(text: &str, language: &str, voice: &str) -> String {
    let mut hasher = md5::Context::new();
    hasher.consume(text.as_bytes());
    hasher.consume([0u8]);
    hasher.consume(language.as_bytes());
    hasher.consume([0u8]);
    hasher.consume(voice.as_bytes());
    format!("{:x}", hasher.compute())
}

/// Обернуть синтезатор кэшем, если он включен в настройках
pub fn with_cache(
    inner: Arc<dyn Synthesizer>,
    config: &CacheConfig,
) -> Result<Arc<dyn Synthesizer>> {
    if !config.enabled {
        return Ok(inner);
    }
    Ok(Arc::new(CachingSynthesizer::from_config(inner, config)?))
}

#[async_trait]
impl<S: Synthesizer> Synthesizer for CachingSynthesizer<S> {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice: &str,
    ) -> std::result::Result<SynthesisResult, SynthesisError> {
        let key = cache_key(text, language, voice);

        let cached = self.memory.lock().get(&key);
        if let Some(hit) = cached {
            debug!("TTS cache hit (memory) for {}", key);
            return Ok(hit);
        }
        if let Some(hit) = self.disk.as_ref().and_then(|disk| disk.load(&key)) {
            debug!("TTS cache hit (disk) for {}", key);
            self.memory.lock().insert(key, hit.clone());
            return Ok(hit);
        }

        let result = self.inner.synthesize(text, language, voice).await?;

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.store(&key, &result) {
                warn!("Failed to store TTS result in disk cache: {}", e);
            }
        }
        self.memory.lock().insert(key, result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::mock::ScriptedSynthesizer;

    #[test]
    fn test_key_depends_on_all_parts() {
        let key = cache_key("hello", "en-US", "alloy");
        assert_eq!(key.len(), 32);
        assert_ne!(key, cache_key("hello", "en-GB", "alloy"));
        assert_ne!(key, cache_key("hello", "en-US", "nova"));
        assert_ne!(cache_key("ab", "c", "v"), cache_key("a", "bc", "v"));
    }

    #[tokio::test]
    async fn test_memory_cache_skips_repeated_calls() {
        let cached = CachingSynthesizer::new(ScriptedSynthesizer::new());

        let first = cached.synthesize("Hello", "en-US", "alloy").await.unwrap();
        let second = cached.synthesize("Hello", "en-US", "alloy").await.unwrap();
        cached.synthesize("Hello", "en-US", "nova").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner.calls("Hello"), 2);
        assert_eq!(cached.len(), 2);
    }

    #[tokio::test]
    async fn test_disk_cache_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();

        let cached =
            CachingSynthesizer::with_disk(ScriptedSynthesizer::new(), dir.path(), None).unwrap();
        let original = cached.synthesize("Persisted", "en-US", "alloy").await.unwrap();

        let reopened =
            CachingSynthesizer::with_disk(ScriptedSynthesizer::new(), dir.path(), None).unwrap();
        let restored = reopened.synthesize("Persisted", "en-US", "alloy").await.unwrap();

        assert_eq!(reopened.inner.calls("Persisted"), 0);
        assert_eq!(restored.clip, original.clip);

        reopened.clear().unwrap();
        assert!(reopened.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_disk_cache_evicts_to_limit() {
        let dir = tempfile::tempdir().unwrap();
        // Один клип "abcdefghij" = 0.5s * 8000 * 4 байта = 16000 байт
        let cached =
            CachingSynthesizer::with_disk(ScriptedSynthesizer::new(), dir.path(), Some(20_000))
                .unwrap();

        cached.synthesize("abcdefghij", "en-US", "alloy").await.unwrap();
        cached.synthesize("klmnopqrst", "en-US", "alloy").await.unwrap();

        let total: u64 = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().metadata().unwrap().len())
            .sum();
        assert!(total <= 20_000, "cache holds {} bytes", total);
    }

    #[tokio::test]
    async fn test_memory_cache_evicts_oldest_to_limit() {
        // Клип из 10 символов: 0.5s * 8000 * 4 байта = 16000 байт
        let cached =
            CachingSynthesizer::with_memory_limit(ScriptedSynthesizer::new(), Some(40_000));

        for text in ["abcdefghij", "klmnopqrst", "uvwxyzabcd"] {
            cached.synthesize(text, "en-US", "alloy").await.unwrap();
        }

        assert_eq!(cached.len(), 2);
        assert_eq!(cached.memory_size(), 32_000);

        // Самый старый клип вытеснен и синтезируется заново
        cached.synthesize("abcdefghij", "en-US", "alloy").await.unwrap();
        cached.synthesize("uvwxyzabcd", "en-US", "alloy").await.unwrap();
        assert_eq!(cached.inner.calls("abcdefghij"), 2);
        assert_eq!(cached.inner.calls("uvwxyzabcd"), 1);
        assert!(cached.memory_size() <= 40_000);
    }

    #[tokio::test]
    async fn test_default_config_bounds_memory_cache() {
        let config = CacheConfig { max_size_bytes: Some(16_000), ..CacheConfig::default() };
        let cached = CachingSynthesizer::from_config(ScriptedSynthesizer::new(), &config).unwrap();
        assert!(config.dir.is_none());

        cached.synthesize("abcdefghij", "en-US", "alloy").await.unwrap();
        cached.synthesize("klmnopqrst", "en-US", "alloy").await.unwrap();

        assert_eq!(cached.len(), 1);
        assert_eq!(cached.memory_size(), 16_000);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cached = CachingSynthesizer::new(
            ScriptedSynthesizer::new().failing_times("retry me", 1, SynthesisError::Timeout),
        );
        assert!(cached.synthesize("retry me", "en-US", "alloy").await.is_err());
        assert!(cached.synthesize("retry me", "en-US", "alloy").await.is_ok());
        assert_eq!(cached.inner.calls("retry me"), 2);
    }
}
