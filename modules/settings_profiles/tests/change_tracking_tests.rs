//! Integration tests for validate (commit) and discard (rollback)

use settings_profiles::{EntryValue, SettingsContainer, SettingsKey, SettingsListKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::{init_tracing, print_test_header};

fn counter() -> (Arc<AtomicUsize>, impl Fn(&settings_profiles::ChangesValidatedEvent) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    (count, move |_: &settings_profiles::ChangesValidatedEvent| {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_discard_restores_previous_value() {
    init_tracing();
    print_test_header(
        "test_discard_restores_previous_value",
        &["Set v1 then discard: the value is back to v0 and nothing is pending"],
    );

    let container = SettingsContainer::new();
    let key = SettingsKey::new("Editor/WordWrap", &container, false).unwrap();
    let (fired, handler) = counter();
    key.on_changes_validated(handler);

    let root = container.root_profile();
    key.set(true).unwrap();
    assert!(key.get().unwrap());
    assert_eq!(root.transaction_count(), 1);
    assert!(root.modified_names().contains("Editor/WordWrap"));

    root.discard_settings_changes();

    assert!(!key.get().unwrap());
    assert_eq!(root.transaction_count(), 0);
    assert!(root.modified_names().is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_validate_keeps_value_and_fires_once() {
    print_test_header(
        "test_validate_keeps_value_and_fires_once",
        &["Several sets then validate: the last value stays, one notification per key"],
    );

    let container = SettingsContainer::new();
    let key = SettingsKey::new("Editor/FontFamily", &container, "Mono".to_string()).unwrap();
    let other = SettingsKey::new("Editor/LineHeight", &container, 1.2_f64).unwrap();
    let (fired, handler) = counter();
    key.on_changes_validated(handler);
    let (other_fired, other_handler) = counter();
    other.on_changes_validated(other_handler);

    key.set("Fira".to_string()).unwrap();
    key.set("Iosevka".to_string()).unwrap();
    assert_eq!(container.root_profile().transaction_count(), 2);

    container.root_profile().validate_settings_changes();

    assert_eq!(key.get().unwrap(), "Iosevka");
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(other_fired.load(Ordering::SeqCst), 0);
    assert!(container.root_profile().modified_names().is_empty());
    assert_eq!(container.root_profile().transaction_count(), 0);

    // nothing left to report
    container.root_profile().validate_settings_changes();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_setting_equal_value_is_not_a_change() {
    print_test_header(
        "test_setting_equal_value_is_not_a_change",
        &["Re-setting the current value records nothing, including structurally equal lists"],
    );

    let container = SettingsContainer::new();
    let scalar = SettingsKey::new("Build/Jobs", &container, 8_u32).unwrap();
    let list = SettingsListKey::new("Build/Targets", &container, ["x86_64".to_string(), "aarch64".to_string()])
        .unwrap();
    let root = container.root_profile();

    scalar.set(8).unwrap();
    list.set_list(["x86_64".to_string(), "aarch64".to_string()], None)
        .unwrap();

    assert_eq!(root.transaction_count(), 0);
    assert!(root.modified_names().is_empty());

    list.update_list(None, |targets| targets.reverse()).unwrap();
    assert_eq!(root.transaction_count(), 1);
    assert_eq!(list.get_list().unwrap(), vec!["aarch64", "x86_64"]);
}

#[test]
fn test_discard_only_reverts_tracked_changes() {
    print_test_header(
        "test_discard_only_reverts_tracked_changes",
        &[
            "Creating an entry in a child profile is not a tracked change",
            "Replacing it afterwards is, and discard goes back to the created value",
        ],
    );

    let container = SettingsContainer::new();
    let key = SettingsKey::new("Git/Branch", &container, "main".to_string()).unwrap();
    let profile = container.create_profile(true, None).unwrap();

    key.set("develop".to_string()).unwrap();
    assert_eq!(profile.transaction_count(), 0);

    key.set("feature".to_string()).unwrap();
    key.set("release".to_string()).unwrap();
    assert_eq!(profile.transaction_count(), 2);

    profile.discard_settings_changes();
    assert_eq!(key.get().unwrap(), "develop");
    assert_eq!(key.get_value(Some(&container.root_profile()), true, false).unwrap(), "main");
}

#[test]
fn test_handler_may_write_settings() {
    print_test_header(
        "test_handler_may_write_settings",
        &["A changes-validated handler can write another key without deadlocking"],
    );

    let container = SettingsContainer::new();
    let source = SettingsKey::new("Sync/Source", &container, 0_i32).unwrap();
    let mirror = SettingsKey::new("Sync/Mirror", &container, 0_i32).unwrap();

    let target = mirror.clone();
    source.on_changes_validated(move |event| {
        let value = event.profile.get_value("Sync/Source", true, false);
        if let Some(EntryValue::Decoded(value)) = value {
            if let Some(number) = value.downcast_ref::<i32>() {
                target.set_value(*number * 2, Some(&event.profile)).unwrap();
            }
        }
    });

    source.set(21).unwrap();
    container.root_profile().validate_settings_changes();

    assert_eq!(mirror.get().unwrap(), 42);
    // the mirror write is a new pending change
    assert!(container.root_profile().modified_names().contains("Sync/Mirror"));
}

#[test]
fn test_untracked_entry_never_reports() {
    let container = SettingsContainer::new();
    let key = SettingsKey::new("Window/Width", &container, 800_u32).unwrap();
    let root = container.root_profile();
    assert!(root.set_should_notify(key.name(), false));

    key.set(1024).unwrap();
    assert_eq!(key.get().unwrap(), 1024);
    assert_eq!(root.transaction_count(), 0);

    root.discard_settings_changes();
    assert_eq!(key.get().unwrap(), 1024);
}
