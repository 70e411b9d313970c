use std::path::Path;

use tempfile::tempdir;
use tsj_metadata::cache::{FileDescriptorCache, MemoryDescriptorCache};
use tsj_metadata::classpath::ClasspathEntry;
use tsj_metadata::fixture::{write_class, ClassFileBuilder, JarBuilder};
use tsj_metadata::{CacheStats, ResolutionStatus, ResolverConfig, SymbolTable};

fn class_dir(root: &Path, names: &[&str]) -> ClasspathEntry {
    for name in names {
        write_class(root, name, &ClassFileBuilder::new(*name).build()).expect("write class");
    }
    ClasspathEntry::Directory(root.to_path_buf())
}

fn file_cache(path: &Path) -> Box<FileDescriptorCache> {
    Box::new(FileDescriptorCache::new(path))
}

#[test]
fn repeated_lookups_parse_each_class_once() {
    let dir = tempdir().unwrap();
    let entry = class_dir(dir.path(), &["com/acme/Widget"]);
    let mut table = SymbolTable::new(vec![entry], "fp", 21);

    let first = table.resolve_class("com.acme.Widget").expect("first lookup");
    let second = table.resolve_class("com/acme/Widget").expect("second lookup");

    assert_eq!(first.internal_name, "com/acme/Widget");
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(table.parse_count("com.acme.Widget"), 1);
    assert_eq!(
        table.cache_stats(),
        CacheStats {
            hits: 1,
            misses: 1,
            invalidations: 0
        }
    );
}

#[test]
fn first_classpath_entry_wins() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let entries = vec![
        class_dir(first.path(), &["p/Shared"]),
        class_dir(second.path(), &["p/Shared", "p/OnlySecond"]),
    ];
    let mut table = SymbolTable::new(entries, "fp", 21);

    let shared = table.resolve_class_with_metadata("p.Shared");
    assert_eq!(shared.origin.unwrap().entry, first.path());
    let only = table.resolve_class_with_metadata("p.OnlySecond");
    assert_eq!(only.origin.unwrap().entry, second.path());
}

#[test]
fn persistent_cache_round_trip_avoids_reparsing() -> anyhow::Result<()> {
    let classes = tempdir()?;
    let cache_dir = tempdir()?;
    let cache_file = cache_dir.path().join("descriptors.bin");
    let entry = class_dir(classes.path(), &["a/One", "a/Two"]);

    {
        let mut table = SymbolTable::new(vec![entry.clone()], "fp-1", 21).with_cache_store(
            file_cache(&cache_file),
            "tsj-descriptor-cache",
            "1",
        );
        assert!(table.resolve_class("a.One").is_some());
        assert!(table.resolve_class("a.Two").is_some());
        assert!(table.resolve_class("a.Missing").is_none());
        table.checkpoint()?;
    }

    let mut reopened = SymbolTable::new(vec![entry.clone()], "FP-1", 21).with_cache_store(
        file_cache(&cache_file),
        "tsj-descriptor-cache",
        "1",
    );
    assert_eq!(reopened.cache_len(), 3);
    assert!(reopened.resolve_class("a.One").is_some());
    assert!(reopened.resolve_class("a.Two").is_some());
    assert_eq!(
        reopened.resolve_class_with_metadata("a.Missing").status,
        ResolutionStatus::ClassNotFound
    );
    assert_eq!(reopened.cache_stats().misses, 0);
    assert_eq!(reopened.cache_stats().hits, 3);
    assert_eq!(reopened.parse_count("a.One"), 0);
    assert!(reopened.diagnostics().is_empty());
    Ok(())
}

#[test]
fn schema_version_change_invalidates_whole_cache() -> anyhow::Result<()> {
    let classes = tempdir()?;
    let entry = class_dir(classes.path(), &["a/One", "a/Two"]);
    let store = MemoryDescriptorCache::new();

    {
        let mut table = SymbolTable::new(vec![entry.clone()], "fp", 21).with_cache_store(
            Box::new(store.clone()),
            "tsj-descriptor-cache",
            "1",
        );
        table.resolve_class("a.One");
        table.resolve_class("a.Two");
        table.checkpoint()?;
    }

    let mut table = SymbolTable::new(vec![entry], "fp", 21).with_cache_store(
        Box::new(store.clone()),
        "tsj-descriptor-cache",
        "2",
    );
    assert_eq!(table.cache_stats().invalidations, 1);
    assert_eq!(table.cache_len(), 0);
    assert_eq!(table.diagnostics().len(), 1);
    assert!(table.diagnostics()[0].contains("invalidated"));
    assert!(store.snapshot().is_none());

    table.resolve_class("a.One");
    table.resolve_class("a.Two");
    assert_eq!(table.cache_stats().misses, 2);
    assert_eq!(table.cache_stats().invalidations, 1);
    Ok(())
}

#[test]
fn fingerprint_mismatch_on_load_is_an_invalidation() -> anyhow::Result<()> {
    let classes = tempdir()?;
    let entry = class_dir(classes.path(), &["a/One"]);
    let store = MemoryDescriptorCache::new();
    {
        let mut table = SymbolTable::new(vec![entry.clone()], "old", 21)
            .with_cache_store(Box::new(store.clone()), "", "");
        table.resolve_class("a.One");
        table.checkpoint()?;
    }

    let table = SymbolTable::new(vec![entry], "new", 21)
        .with_cache_store(Box::new(store.clone()), "", "");
    assert_eq!(table.cache_stats().invalidations, 1);
    assert_eq!(table.cache_len(), 0);
    Ok(())
}

#[test]
fn corrupt_cache_file_degrades_to_empty_cache() -> anyhow::Result<()> {
    let classes = tempdir()?;
    let cache_dir = tempdir()?;
    let cache_file = cache_dir.path().join("descriptors.bin");
    std::fs::write(&cache_file, b"definitely not a cache")?;

    let mut table = SymbolTable::new(vec![class_dir(classes.path(), &["a/One"])], "fp", 21)
        .with_cache_store(file_cache(&cache_file), "", "");

    assert_eq!(table.cache_len(), 0);
    assert_eq!(table.cache_stats().invalidations, 1);
    assert_eq!(table.diagnostics().len(), 1);
    assert!(table.diagnostics()[0].starts_with("Persistent descriptor cache could not be loaded"));
    assert!(table.resolve_class("a.One").is_some());

    table.checkpoint()?;
    let reopened = SymbolTable::new(Vec::new(), "fp", 21)
        .with_cache_store(file_cache(&cache_file), "", "");
    assert_eq!(reopened.cache_len(), 1);
    Ok(())
}

#[test]
fn update_classpath_drops_entries_only_when_fingerprint_changes() {
    let dir = tempdir().unwrap();
    let entry = class_dir(dir.path(), &["a/One"]);
    let mut table = SymbolTable::new(vec![entry.clone()], "fp-1", 21);
    table.resolve_class("a.One");

    table.update_classpath(vec![entry.clone()], " FP-1 ");
    assert_eq!(table.cache_len(), 1);
    assert_eq!(table.cache_stats().invalidations, 0);

    table.update_classpath(vec![entry], "fp-2");
    assert_eq!(table.cache_len(), 0);
    assert_eq!(table.cache_stats().invalidations, 1);
    assert_eq!(table.fingerprint(), "fp-2");

    table.resolve_class("a.One");
    assert_eq!(table.parse_count("a.One"), 2);
}

#[test]
fn multi_release_selection_follows_target_release() {
    let dir = tempdir().unwrap();
    let jar = dir.path().join("mr.jar");
    JarBuilder::new()
        .multi_release()
        .class("mr/Api", ClassFileBuilder::new("mr/Api").version(52, 0).build())
        .versioned_class(21, "mr/Api", ClassFileBuilder::new("mr/Api").version(65, 0).build())
        .write(&jar)
        .unwrap();

    let mut table = SymbolTable::new(vec![ClasspathEntry::Jar(jar.clone())], "fp", 17);
    let base = table.resolve_class_with_metadata("mr.Api");
    assert_eq!(base.status, ResolutionStatus::Found);
    let origin = base.origin.unwrap();
    assert!(!origin.versioned);
    assert_eq!(origin.selected_version, None);
    assert_eq!(origin.entry_name, "mr/Api.class");
    assert_eq!(base.descriptor.unwrap().major_version, 52);

    table.set_target_release(21);
    let versioned = table.resolve_class_with_metadata("mr.Api");
    let origin = versioned.origin.unwrap();
    assert!(origin.versioned);
    assert_eq!(origin.selected_version, Some(21));
    assert_eq!(origin.entry_name, "META-INF/versions/21/mr/Api.class");
    assert_eq!(versioned.descriptor.unwrap().major_version, 65);
}

#[test]
fn higher_release_only_classes_report_target_mismatch() {
    let dir = tempdir().unwrap();
    let jar = dir.path().join("future.jar");
    JarBuilder::new()
        .multi_release()
        .versioned_class(21, "f/Future", ClassFileBuilder::new("f/Future").version(65, 0).build())
        .versioned_class(22, "f/Future", ClassFileBuilder::new("f/Future").version(66, 0).build())
        .write(&jar)
        .unwrap();

    let mut table = SymbolTable::new(vec![ClasspathEntry::Jar(jar.clone())], "fp", 17);
    let resolution = table.resolve_class_with_metadata("f.Future");
    assert_eq!(resolution.status, ResolutionStatus::TargetLevelMismatch);
    assert_eq!(
        resolution.diagnostic.as_deref(),
        Some("target-level-mismatch: requires class version 21")
    );
    assert_eq!(table.parse_count("f.Future"), 0);

    let fallback = tempdir().unwrap();
    table.update_classpath(
        vec![
            ClasspathEntry::Jar(jar),
            class_dir(fallback.path(), &["f/Future"]),
        ],
        "fp-2",
    );
    let resolution = table.resolve_class_with_metadata("f.Future");
    assert_eq!(resolution.status, ResolutionStatus::Found);
    assert_eq!(resolution.origin.unwrap().entry, fallback.path());
}

#[test]
fn from_config_searches_runtime_image_first() -> anyhow::Result<()> {
    let image = tempdir()?;
    let classes = tempdir()?;
    write_class(
        &image.path().join("modules").join("java.base"),
        "java/lang/Object",
        &ClassFileBuilder::new("java/lang/Object").no_super().build(),
    )?;
    class_dir(classes.path(), &["java/lang/Object", "app/Main"]);

    let config = ResolverConfig::default()
        .with_runtime_image(image.path())
        .with_classpath([classes.path().to_string_lossy().into_owned()])
        .with_target_release(17);
    let mut table = SymbolTable::from_config(&config)?;

    assert_eq!(table.target_release(), 17);
    assert_eq!(table.fingerprint().len(), 64);
    let object = table.resolve_class_with_metadata("java.lang.Object");
    let origin = object.origin.unwrap();
    assert_eq!(origin.module_name.as_deref(), Some("java.base"));
    assert!(object.descriptor.unwrap().super_name.is_none());
    assert!(table.resolve_class("app.Main").is_some());
    Ok(())
}
