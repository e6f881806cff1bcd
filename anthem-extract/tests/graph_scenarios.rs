//! Graph construction scenarios over synthetic installation trees

mod common;

use anthem_extract::{Error, GameGraph, Layer, StorageConfig, SuperbundleStatus};
use common::*;
use tempfile::tempdir;

fn config(root: &std::path::Path) -> StorageConfig {
    init_logging();
    StorageConfig {
        root: root.to_path_buf(),
        ..StorageConfig::default()
    }
}

#[test]
fn empty_superbundle_builds_with_no_bundles() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root("Data", vec![], &["win32/empty"]),
    );
    write_superbundle_toc(
        dir.path(),
        "Data",
        "win32/empty",
        &sb_toc_inline("win32/empty", vec![]),
    );

    let graph = GameGraph::build(&config(dir.path())).unwrap();
    assert_eq!(graph.superbundles().count(), 1);
    assert_eq!(graph.bundles().count(), 0);
    let (_, sb) = graph.superbundles().next().unwrap();
    assert_eq!(sb.name, "win32/empty");
    assert!(matches!(sb.status, SuperbundleStatus::Loaded));
}

#[test]
fn missing_data_layout_aborts() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        GameGraph::build(&config(dir.path())),
        Err(Error::Io(_))
    ));
}

#[test]
fn corrupt_layout_magic_aborts() {
    let dir = tempdir().unwrap();
    let mut bytes = toc_bytes(&layout_root("Data", vec![], &[]), false);
    bytes[0] = 0xff;
    std::fs::create_dir_all(dir.path().join("Data")).unwrap();
    std::fs::write(dir.path().join("Data/layout.toc"), bytes).unwrap();
    assert!(matches!(
        GameGraph::build(&config(dir.path())),
        Err(Error::Container(sbtoc_parser::Error::FormatMismatch(_)))
    ));
}

#[test]
fn corrupt_superbundle_toc_aborts() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root("Data", vec![], &["win32/bad"]),
    );
    std::fs::create_dir_all(dir.path().join("Data/win32")).unwrap();
    std::fs::write(dir.path().join("Data/win32/bad.toc"), b"junk").unwrap();
    assert!(matches!(
        GameGraph::build(&config(dir.path())),
        Err(Error::Container(_))
    ));
}

#[test]
fn patch_superbundle_shadows_data_by_name() {
    let dir = tempdir().unwrap();
    let sha_data = [0x0d; 20];
    let sha_patch = [0x0e; 20];

    write_layout(
        dir.path(),
        "Data",
        &layout_root(
            "Data",
            vec![package_val("base", "win32/base", &["win32/base/sb"], &[], false)],
            &[],
        ),
    );
    write_superbundle_toc(
        dir.path(),
        "Data",
        "win32/base/sb",
        &sb_toc_inline(
            "win32/base/sb",
            vec![bundle_body(
                "old",
                vec![ebx_part("a/old", sha_data, 5, cas_id(false, 0, 1), 0, 13)],
                vec![],
                vec![],
            )],
        ),
    );

    write_layout(
        dir.path(),
        "Patch",
        &layout_root(
            "Patch",
            vec![package_val("base", "win32/base", &["win32/base/sb"], &[], false)],
            &[],
        ),
    );
    write_superbundle_toc(
        dir.path(),
        "Patch",
        "win32/base/sb",
        &sb_toc_inline(
            "win32/base/sb",
            vec![bundle_body(
                "new",
                vec![ebx_part("a/new", sha_patch, 5, cas_id(true, 0, 1), 0, 13)],
                vec![],
                vec![],
            )],
        ),
    );

    let graph = GameGraph::build(&config(dir.path())).unwrap();
    assert_eq!(graph.superbundles().count(), 1);
    let (sb_id, sb) = graph.superbundles().next().unwrap();
    assert_eq!(sb.layer, Layer::Patch);
    assert!(graph.bundle_by_name(sb_id, "new").is_some());
    assert!(graph.bundle_by_name(sb_id, "old").is_none());
    assert!(graph.part_by_sha1(&anthem_extract::Sha1::new(sha_patch)).is_some());
    assert!(graph.part_by_sha1(&anthem_extract::Sha1::new(sha_data)).is_none());
}

#[test]
fn out_of_range_sb_bundle_is_kept_unavailable() {
    let dir = tempdir().unwrap();
    let body = encode_value(&bundle_body(
        "real",
        vec![ebx_part("x/y", [1; 20], 5, cas_id(false, 0, 1), 0, 13)],
        vec![],
        vec![],
    ));
    let (sb, ranges) = sb_bytes(&[body]);

    write_layout(
        dir.path(),
        "Data",
        &layout_root("Data", vec![], &["win32/world"]),
    );
    write_superbundle_toc(
        dir.path(),
        "Data",
        "win32/world",
        &sb_toc_ranged(
            "win32/world",
            &[
                ("real", ranges[0].0, ranges[0].1),
                ("loc/pl", 1 << 20, 4096),
            ],
            vec![],
        ),
    );
    write_sb(dir.path(), "Data", "win32/world", &sb);

    let graph = GameGraph::build(&config(dir.path())).unwrap();
    let bundles: Vec<_> = graph.bundles().collect();
    assert_eq!(bundles.len(), 2);
    assert!(bundles[0].1.available);
    assert_eq!(bundles[0].1.name, "real");
    assert!(!bundles[1].1.available);
    assert_eq!(bundles[1].1.name, "loc/pl");
}

#[test]
fn missing_sb_companion_demotes_superbundle() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root("Data", vec![], &["win32/world"]),
    );
    write_superbundle_toc(
        dir.path(),
        "Data",
        "win32/world",
        &sb_toc_ranged("win32/world", &[("b", 4, 16)], vec![]),
    );

    let graph = GameGraph::build(&config(dir.path())).unwrap();
    let (_, sb) = graph.superbundles().next().unwrap();
    assert!(matches!(sb.status, SuperbundleStatus::Unavailable(_)));
    assert!(sb.bundles.is_empty());
}

#[test]
fn missing_optional_package_toc_demotes_superbundle() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root(
            "Data",
            vec![package_val(
                "audio_pl",
                "win32/audio_pl",
                &["win32/audio_pl/sb"],
                &[],
                true,
            )],
            &[],
        ),
    );

    let graph = GameGraph::build(&config(dir.path())).unwrap();
    let (_, sb) = graph.superbundles().next().unwrap();
    assert!(matches!(sb.status, SuperbundleStatus::Unavailable(_)));
}

#[test]
fn missing_required_package_toc_aborts() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root(
            "Data",
            vec![package_val("base", "win32/base", &["win32/base/sb"], &[], false)],
            &[],
        ),
    );
    assert!(matches!(
        GameGraph::build(&config(dir.path())),
        Err(Error::Io(_))
    ));
}

#[test]
fn part_with_reserved_identifier_bits_aborts() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root("Data", vec![], &["win32/broken"]),
    );
    write_superbundle_toc(
        dir.path(),
        "Data",
        "win32/broken",
        &sb_toc_inline(
            "win32/broken",
            vec![bundle_body(
                "b",
                vec![ebx_part("x", [1; 20], 5, 0xfe00_0001, 0, 13)],
                vec![],
                vec![],
            )],
        ),
    );
    assert!(matches!(
        GameGraph::build(&config(dir.path())),
        Err(Error::FormatMismatch(_))
    ));
}

#[test]
fn packages_enumerate_in_topological_order() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root(
            "Data",
            vec![
                package_val("ui", "win32/ui", &[], &["core"], false),
                package_val("core", "win32/core", &[], &[], false),
            ],
            &[],
        ),
    );
    let graph = GameGraph::build(&config(dir.path())).unwrap();
    let order: Vec<&str> = graph
        .resolver()
        .topo_packages(Layer::Data)
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(order, ["core", "ui"]);
    // Declared order still defines package ids.
    assert_eq!(graph.resolver().package_id(Layer::Data, "ui"), Some(0));
    assert_eq!(graph.resolver().package_id(Layer::Data, "core"), Some(1));
}

#[test]
fn layout_level_resources_enter_the_graph() {
    let dir = tempdir().unwrap();
    write_layout(
        dir.path(),
        "Data",
        &layout_root_with_resources(
            "Data",
            vec![package_val("base", "win32/base", &[], &[], false)],
            &[],
            vec![toc_resource([3; 16], [0xfa; 20], cas_id(false, 0, 1), 0, 16)],
        ),
    );
    let graph = GameGraph::build(&config(dir.path())).unwrap();
    let part = graph
        .part_by_sha1(&anthem_extract::Sha1::new([0xfa; 20]))
        .unwrap();
    assert!(matches!(part, anthem_extract::Part::TocResource(_)));
    assert_eq!(part.compressed_size(), 16);
    assert_eq!(part.flat_size(), None);
}

#[test]
fn graph_exposes_parts_by_uid_and_package_bundles() {
    let dir = tempdir().unwrap();
    let uid = [7u8; 16];
    write_layout(
        dir.path(),
        "Data",
        &layout_root(
            "Data",
            vec![package_val("base", "win32/base", &["win32/base/sb"], &[], false)],
            &[],
        ),
    );
    write_superbundle_toc(
        dir.path(),
        "Data",
        "win32/base/sb",
        &sb_toc_inline(
            "win32/base/sb",
            vec![bundle_body(
                "world",
                vec![],
                vec![],
                vec![chunk_part(uid, [2; 20], cas_id(false, 0, 1), 0, 21)],
            )],
        ),
    );

    let graph = GameGraph::build(&config(dir.path())).unwrap();
    assert!(graph.part_by_uid(&anthem_extract::Guid::new(uid)).is_some());
    let bundles: Vec<_> = graph.package_bundles(Layer::Data, 0).collect();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].1.name, "world");
}
