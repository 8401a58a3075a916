//! Common test utilities and in-memory collaborators
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use settings_profiles::domain::FileSystem;
use settings_profiles::{ManualFileWatcher, SettingsConfig, SettingsContainer};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}

/// Route `tracing` output to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Files kept in memory; a written file becomes visible on flush or drop
#[derive(Clone, Default)]
pub struct InMemoryFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, text: &str) {
        self.files.write().insert(path.into(), text.as_bytes().to_vec());
    }

    pub fn read_text(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .read()
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn count(&self) -> usize {
        self.files.read().len()
    }

    /// Make every subsequent `open_write` fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Print verbose information about the stored files
    pub fn print_state(&self, context: &str) {
        let files = self.files.read();
        println!("\n========== InMemoryFileSystem State: {} ==========", context);
        println!("Total files: {}", files.len());
        for (path, bytes) in files.iter() {
            println!("\n  File: {}", path.display());
            for line in String::from_utf8_lossy(bytes).lines() {
                println!("    {}", line);
            }
        }
        println!("====================================================\n");
    }
}

impl FileSystem for InMemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read>> {
        let bytes = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", path.display()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied: {}", path.display()));
        }
        Ok(Box::new(InMemoryWriter {
            path: path.to_path_buf(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no such file: {}", path.display()))
    }
}

struct InMemoryWriter {
    path: PathBuf,
    buffer: Vec<u8>,
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.files.write().insert(self.path.clone(), self.buffer.clone());
        Ok(())
    }
}

impl Drop for InMemoryWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Container over an in-memory file system
pub fn memory_container(files: &InMemoryFileSystem) -> SettingsContainer {
    SettingsContainer::builder()
        .file_system(Arc::new(files.clone()))
        .build()
}

/// Container over an in-memory file system that watches loaded profiles
pub fn watched_container(files: &InMemoryFileSystem, watcher: &ManualFileWatcher) -> SettingsContainer {
    let config = SettingsConfig {
        monitor_file_modification: true,
        ..SettingsConfig::default()
    };
    SettingsContainer::builder()
        .config(config)
        .file_system(Arc::new(files.clone()))
        .file_watcher(Arc::new(watcher.clone()))
        .build()
}

pub const SAMPLE_SETTINGS: &str = "!SettingsFile
Settings:
    Test/Lists/IntList:
        - 1
        - 3
    Test/Lists/StringList:
        - String 1
        - String 2.5
        - String 3
    Test/Simple/IntValue: 45
    Test/Simple/StringValue: 07/25/2004 18:18:00
    Test/Unknown/Nested:
        Name: Custom
        Weights: [0.5, 1.5]
        Enabled: true
";
