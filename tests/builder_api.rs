#![allow(missing_docs)]

use std::time::Duration;

use imagegear::{
    ConfigError, Gallery, GalleryBuilder, GalleryConfig, Limits, MediaKind, MemoryIndex,
    MemoryStore,
};

#[test]
fn builder_defaults_match_config_defaults() {
    let builder = GalleryBuilder::default();
    assert_eq!(builder.config(), &GalleryConfig::default());

    let gallery = Gallery::builder()
        .storage(MemoryStore::new())
        .build()
        .expect("default config should be valid");
    assert_eq!(gallery.config(), &GalleryConfig::default());
    assert_eq!(gallery.config().workers, 16);
    assert_eq!(gallery.config().reconcile_interval, Duration::from_secs(30));
    assert_eq!(gallery.config().limits.max_file_size, Some(5 * 1024 * 1024));
    assert!(gallery.index().is_none());
}

#[test]
fn fluent_chaining_sets_expected_configuration() {
    let gallery = Gallery::builder()
        .storage(MemoryStore::new())
        .index(MemoryIndex::new())
        .max_file_size(1024)
        .max_body_size(4096)
        .max_files(3)
        .workers(4)
        .reconcile_interval(Duration::from_secs(5))
        .index_timeout(Duration::from_secs(2))
        .allowed_kinds([MediaKind::Png, MediaKind::Webp])
        .file_field("photos")
        .build()
        .expect("builder config should validate");

    assert_eq!(
        gallery.config(),
        &GalleryConfig {
            limits: Limits {
                max_file_size: Some(1024),
                max_body_size: Some(4096),
                max_files: Some(3),
            },
            workers: 4,
            reconcile_interval: Duration::from_secs(5),
            index_timeout: Duration::from_secs(2),
            allowed_kinds: vec![MediaKind::Png, MediaKind::Webp],
            file_field: "photos".to_owned(),
        }
    );
    assert!(gallery.index().is_some());
    assert_eq!(gallery.reconciler().interval(), Duration::from_secs(5));
}

#[test]
fn build_requires_storage() {
    let result = Gallery::builder().build();
    assert!(matches!(result, Err(ConfigError::MissingStorage)));
}

#[test]
fn build_surfaces_config_errors() {
    let base = || Gallery::builder().storage(MemoryStore::new());

    assert!(matches!(
        base().workers(0).build(),
        Err(ConfigError::ZeroWorkers)
    ));
    assert!(matches!(
        base().reconcile_interval(Duration::ZERO).build(),
        Err(ConfigError::ZeroDuration {
            setting: "reconcile_interval"
        })
    ));
    assert!(matches!(
        base().allowed_kinds(Vec::<MediaKind>::new()).build(),
        Err(ConfigError::NoAcceptedKinds)
    ));
    assert!(matches!(
        base().file_field(" ").build(),
        Err(ConfigError::EmptyFileField)
    ));
    assert!(matches!(
        base().max_file_size(10).max_body_size(5).build(),
        Err(ConfigError::InvalidLimit {
            limit: "max_file_size",
            ..
        })
    ));
    assert!(matches!(
        base().limits(Limits::unlimited()).max_files(0).build(),
        Err(ConfigError::InvalidLimit {
            limit: "max_files",
            ..
        })
    ));
}

#[test]
fn media_kinds_parse_from_config_strings() {
    assert_eq!(
        GalleryConfig::parse_kinds("jpeg, image/png,,webp").expect("valid list"),
        vec![MediaKind::Jpeg, MediaKind::Png, MediaKind::Webp]
    );
    assert!(matches!(
        GalleryConfig::parse_kinds("png,bmp"),
        Err(ConfigError::UnknownMediaKind(kind)) if kind == "bmp"
    ));
}
