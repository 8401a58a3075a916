//! Integration tests for reacting to external modification of settings files

use anyhow::Result;
use settings_profiles::domain::{FileChangeCallback, FileSystem, FileWatcher, WatchSubscription};
use settings_profiles::{ManualFileWatcher, SettingsConfig, SettingsContainer, SettingsKey};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::{init_tracing, print_test_header, watched_container, InMemoryFileSystem};

/// File system that reports every write to the watcher, like a real watcher
/// observing our own save
struct EchoingFileSystem {
    files: InMemoryFileSystem,
    watcher: ManualFileWatcher,
}

impl FileSystem for EchoingFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.files.create_dir_all(path)
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read>> {
        self.files.open_read(path)
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write>> {
        let writer = self.files.open_write(path)?;
        self.watcher.trigger(path);
        Ok(writer)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.files.remove_file(path)
    }
}

/// Watcher that cannot watch one particular path
struct RefusingWatcher {
    inner: ManualFileWatcher,
    refused: PathBuf,
}

impl FileWatcher for RefusingWatcher {
    fn watch(&self, path: &Path, on_change: FileChangeCallback) -> Result<WatchSubscription> {
        if path == self.refused {
            anyhow::bail!("too many watches: {}", path.display());
        }
        self.inner.watch(path, on_change)
    }
}

#[test]
fn test_external_change_can_request_reload() {
    init_tracing();
    print_test_header(
        "test_external_change_can_request_reload",
        &[
            "A watched profile raises file-modified on an external change",
            "A handler asking for a reload gets the new values applied",
        ],
    );

    let files = InMemoryFileSystem::new();
    let watcher = ManualFileWatcher::new();
    files.add_file("watched.settings", "Settings:\n    Log/Level: info\n");
    let container = watched_container(&files, &watcher);
    let level = SettingsKey::new("Log/Level", &container, "warn".to_string()).unwrap();

    let profile = container.load_profile("watched.settings", true, None).unwrap();
    assert!(profile.monitor_file_modification());
    assert_eq!(watcher.watch_count(Path::new("watched.settings")), 1);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::<PathBuf>::new()));
    let paths = Arc::clone(&seen);
    profile.on_file_modified(move |event| {
        paths.lock().push(event.path.clone());
        event.request_reload();
    });

    files.add_file("watched.settings", "Settings:\n    Log/Level: debug\n");
    assert_eq!(watcher.trigger(Path::new("watched.settings")), 1);

    assert_eq!(seen.lock().as_slice(), &[PathBuf::from("watched.settings")]);
    assert_eq!(level.get().unwrap(), "debug");
    println!("✅ External change reloaded");
}

#[test]
fn test_external_change_without_reload_request() {
    let files = InMemoryFileSystem::new();
    let watcher = ManualFileWatcher::new();
    files.add_file("watched.settings", "Settings:\n    Log/Level: info\n");
    let container = watched_container(&files, &watcher);
    let level = SettingsKey::new("Log/Level", &container, "warn".to_string()).unwrap();
    let profile = container.load_profile("watched.settings", true, None).unwrap();

    let raised = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&raised);
    profile.on_file_modified(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    files.add_file("watched.settings", "Settings:\n    Log/Level: trace\n");
    watcher.trigger(Path::new("watched.settings"));

    assert_eq!(raised.load(Ordering::SeqCst), 1);
    assert_eq!(level.get().unwrap(), "info");
}

#[test]
fn test_own_save_is_not_reported() {
    print_test_header(
        "test_own_save_is_not_reported",
        &["Changes observed while the container writes the profile are ignored"],
    );

    let files = InMemoryFileSystem::new();
    let watcher = ManualFileWatcher::new();
    files.add_file("echo.settings", "Settings:\n    Ui/Zoom: 100\n");
    let config = SettingsConfig {
        monitor_file_modification: true,
        ..SettingsConfig::default()
    };
    let container = SettingsContainer::builder()
        .config(config)
        .file_system(Arc::new(EchoingFileSystem {
            files: files.clone(),
            watcher: watcher.clone(),
        }))
        .file_watcher(Arc::new(watcher.clone()))
        .build();
    let zoom = SettingsKey::new("Ui/Zoom", &container, 100_u32).unwrap();
    let profile = container.load_profile("echo.settings", false, None).unwrap();

    let raised = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&raised);
    profile.on_file_modified(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    zoom.set_value(125, Some(&profile)).unwrap();
    container.save_profile(&profile, "echo.settings").unwrap();

    assert_eq!(raised.load(Ordering::SeqCst), 0);
    assert!(!profile.is_saving());

    // the same trigger outside of a save is reported
    watcher.trigger(Path::new("echo.settings"));
    assert_eq!(raised.load(Ordering::SeqCst), 1);
}

#[test]
fn test_watch_follows_the_backing_file() {
    print_test_header(
        "test_watch_follows_the_backing_file",
        &[
            "Saving under a new path moves the watch to the new file",
            "Disabling monitoring or unloading the profile releases the watch",
        ],
    );

    let files = InMemoryFileSystem::new();
    let watcher = ManualFileWatcher::new();
    files.add_file("old.settings", "Settings: {}\n");
    let container = watched_container(&files, &watcher);
    let profile = container.load_profile("old.settings", false, None).unwrap();
    assert_eq!(watcher.watch_count(Path::new("old.settings")), 1);

    container.save_profile(&profile, "new.settings").unwrap();
    assert_eq!(watcher.watch_count(Path::new("old.settings")), 0);
    assert_eq!(watcher.watch_count(Path::new("new.settings")), 1);

    profile.set_monitor_file_modification(false).unwrap();
    assert_eq!(watcher.watch_count(Path::new("new.settings")), 0);
    assert!(!profile.monitor_file_modification());

    profile.set_monitor_file_modification(true).unwrap();
    assert_eq!(watcher.watch_count(Path::new("new.settings")), 1);

    container.unload_profile(&profile).unwrap();
    assert_eq!(watcher.watch_count(Path::new("new.settings")), 0);
}

#[test]
fn test_monitoring_without_backing_file_starts_on_save() {
    let files = InMemoryFileSystem::new();
    let watcher = ManualFileWatcher::new();
    let container = watched_container(&files, &watcher);
    let profile = container.create_profile(false, None).unwrap();

    profile.set_monitor_file_modification(true).unwrap();
    assert!(profile.monitor_file_modification());

    container.save_profile(&profile, "fresh.settings").unwrap();
    assert_eq!(watcher.watch_count(Path::new("fresh.settings")), 1);
}

#[test]
fn test_save_succeeds_when_new_file_cannot_be_watched() {
    print_test_header(
        "test_save_succeeds_when_new_file_cannot_be_watched",
        &["A move whose new file cannot be watched still reports a successful save"],
    );

    let files = InMemoryFileSystem::new();
    let watcher = ManualFileWatcher::new();
    files.add_file("old.settings", "Settings:\n    Ui/Zoom: 100\n");
    let config = SettingsConfig {
        monitor_file_modification: true,
        ..SettingsConfig::default()
    };
    let container = SettingsContainer::builder()
        .config(config)
        .file_system(Arc::new(files.clone()))
        .file_watcher(Arc::new(RefusingWatcher {
            inner: watcher.clone(),
            refused: PathBuf::from("unwatched.settings"),
        }))
        .build();
    let zoom = SettingsKey::new("Ui/Zoom", &container, 100_u32).unwrap();
    let profile = container.load_profile("old.settings", false, None).unwrap();
    zoom.set_value(150, Some(&profile)).unwrap();

    container.save_profile(&profile, "unwatched.settings").unwrap();

    assert_eq!(profile.file_path(), Some(PathBuf::from("unwatched.settings")));
    assert!(files.read_text("unwatched.settings").unwrap().contains("150"));
    assert_eq!(watcher.watch_count(Path::new("old.settings")), 0);
    assert_eq!(watcher.watch_count(Path::new("unwatched.settings")), 0);
    assert!(profile.monitor_file_modification());
}
