//! Shared fixture builders: synthetic layouts, TOCs, SB and CAS files laid
//! out in a temporary game root.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use anthem_extract::{ExtractedItem, OutputSink, PartKind, Sha1};
use fbchunk::{Decompressor, DecompressorError};
use parking_lot::Mutex;
use sbtoc_parser::superbundle::SB_MAGIC;
use sbtoc_parser::toc::{TOC_BODY_OFFSET, TOC_MAGIC, TOC_WRAPPER_MAGIC};

/// A tag stream value for fixture encoding.
#[derive(Debug, Clone)]
pub enum Val {
    Bool(bool),
    I32(i32),
    I64(i64),
    Str(String),
    Sha1([u8; 20]),
    Guid([u8; 16]),
    Blob(Vec<u8>),
    List(Vec<Val>),
    Obj(Vec<(String, Val)>),
}

pub fn varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out
}

/// Encode a value as its full record: type code followed by payload.
pub fn encode_value(value: &Val) -> Vec<u8> {
    match value {
        Val::Bool(v) => vec![0x06, u8::from(*v)],
        Val::I32(v) => {
            let mut out = vec![0x08];
            out.extend_from_slice(&v.to_le_bytes());
            out
        }
        Val::I64(v) => {
            let mut out = vec![0x09];
            out.extend_from_slice(&v.to_le_bytes());
            out
        }
        Val::Str(s) => {
            let mut out = vec![0x07];
            out.extend_from_slice(&varint(s.len() as u64 + 1));
            out.extend_from_slice(s.as_bytes());
            out.push(0);
            out
        }
        Val::Sha1(raw) => {
            let mut out = vec![0x10];
            out.extend_from_slice(raw);
            out
        }
        Val::Guid(raw) => {
            let mut out = vec![0x0f];
            out.extend_from_slice(raw);
            out
        }
        Val::Blob(data) => {
            let mut out = vec![0x13];
            out.extend_from_slice(&varint(data.len() as u64));
            out.extend_from_slice(data);
            out
        }
        Val::List(items) => {
            let mut body = Vec::new();
            for item in items {
                body.extend_from_slice(&encode_value(item));
            }
            body.push(0x00);
            let mut out = vec![0x01];
            out.extend_from_slice(&varint(body.len() as u64));
            out.extend_from_slice(&body);
            out
        }
        Val::Obj(entries) => {
            let mut body = Vec::new();
            for (name, value) in entries {
                let encoded = encode_value(value);
                body.push(encoded[0]);
                body.extend_from_slice(name.as_bytes());
                body.push(0);
                body.extend_from_slice(&encoded[1..]);
            }
            body.push(0x00);
            let mut out = vec![0x02];
            out.extend_from_slice(&varint(body.len() as u64));
            out.extend_from_slice(&body);
            out
        }
    }
}

pub fn obj(entries: &[(&str, Val)]) -> Val {
    Val::Obj(
        entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect(),
    )
}

/// A complete TOC file around a root value.
pub fn toc_bytes(root: &Val, wrapped: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&TOC_MAGIC.to_be_bytes());
    out.resize(TOC_BODY_OFFSET, 0);
    if wrapped {
        out.extend_from_slice(&TOC_WRAPPER_MAGIC.to_be_bytes());
    }
    out.extend_from_slice(&encode_value(root));
    out
}

/// An SB file from encoded bundle bodies; returns the file bytes and each
/// body's (offset, size) range.
pub fn sb_bytes(bodies: &[Vec<u8>]) -> (Vec<u8>, Vec<(u64, u64)>) {
    let mut data = SB_MAGIC.to_be_bytes().to_vec();
    let mut ranges = Vec::new();
    for body in bodies {
        ranges.push((data.len() as u64, body.len() as u64));
        data.extend_from_slice(body);
    }
    (data, ranges)
}

/// One compressed chunk: 8-byte header plus payload.
pub fn cas_chunk(flat: u16, code: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&flat.to_be_bytes());
    out.extend_from_slice(&code.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Pack a CAS identifier from its fields.
pub fn cas_id(patch: bool, package: u16, index: u8) -> u32 {
    u32::from(index) | (u32::from(package) << 8) | (u32::from(patch) << 24)
}

// ---- part and container values ----------------------------------------

pub fn ebx_part(
    name: &str,
    sha1: [u8; 20],
    size: u64,
    cas: u32,
    offset: u64,
    compressed: u64,
) -> Val {
    obj(&[
        ("name", Val::Str(name.to_owned())),
        ("sha1", Val::Sha1(sha1)),
        ("size", Val::I64(size as i64)),
        ("casId", Val::I32(cas as i32)),
        ("offset", Val::I64(offset as i64)),
        ("compressedSize", Val::I64(compressed as i64)),
        ("flags", Val::I32(0)),
    ])
}

pub fn res_part(
    name: &str,
    sha1: [u8; 20],
    size: u64,
    res_type: u32,
    cas: u32,
    offset: u64,
    compressed: u64,
) -> Val {
    obj(&[
        ("name", Val::Str(name.to_owned())),
        ("sha1", Val::Sha1(sha1)),
        ("size", Val::I64(size as i64)),
        ("resType", Val::I32(res_type as i32)),
        ("resMeta", Val::Blob(vec![0xde, 0xad])),
        ("casId", Val::I32(cas as i32)),
        ("offset", Val::I64(offset as i64)),
        ("compressedSize", Val::I64(compressed as i64)),
    ])
}

pub fn chunk_part(id: [u8; 16], sha1: [u8; 20], cas: u32, offset: u64, compressed: u64) -> Val {
    obj(&[
        ("id", Val::Guid(id)),
        ("sha1", Val::Sha1(sha1)),
        ("meta", Val::Blob(Vec::new())),
        ("casId", Val::I32(cas as i32)),
        ("offset", Val::I64(offset as i64)),
        ("compressedSize", Val::I64(compressed as i64)),
    ])
}

pub fn toc_resource(id: [u8; 16], sha1: [u8; 20], cas: u32, offset: u64, size: u64) -> Val {
    obj(&[
        ("id", Val::Guid(id)),
        ("sha1", Val::Sha1(sha1)),
        ("casId", Val::I32(cas as i32)),
        ("offset", Val::I64(offset as i64)),
        ("size", Val::I64(size as i64)),
    ])
}

pub fn bundle_body(path: &str, ebx: Vec<Val>, res: Vec<Val>, chunks: Vec<Val>) -> Val {
    obj(&[
        ("path", Val::Str(path.to_owned())),
        ("ebx", Val::List(ebx)),
        ("res", Val::List(res)),
        ("chunks", Val::List(chunks)),
    ])
}

/// Superbundle TOC with inline bundle bodies (no SB companion).
pub fn sb_toc_inline(name: &str, bundles: Vec<Val>) -> Val {
    obj(&[
        ("name", Val::Str(name.to_owned())),
        ("cas", Val::Bool(true)),
        ("bundles", Val::List(bundles)),
    ])
}

/// Superbundle TOC whose bundles live in the companion SB at the given
/// (offset, size) ranges.
pub fn sb_toc_ranged(name: &str, entries: &[(&str, u64, u64)], resources: Vec<Val>) -> Val {
    let bundles = entries
        .iter()
        .map(|(id, offset, size)| {
            obj(&[
                ("id", Val::Str((*id).to_owned())),
                ("offset", Val::I64(*offset as i64)),
                ("size", Val::I64(*size as i64)),
            ])
        })
        .collect();
    obj(&[
        ("name", Val::Str(name.to_owned())),
        ("cas", Val::Bool(true)),
        ("bundles", Val::List(bundles)),
        ("chunks", Val::List(resources)),
    ])
}

pub fn package_val(
    name: &str,
    install_dir: &str,
    superbundles: &[&str],
    required: &[&str],
    optional: bool,
) -> Val {
    let mut entries = vec![
        ("name".to_owned(), Val::Str(name.to_owned())),
        ("installDir".to_owned(), Val::Str(install_dir.to_owned())),
        (
            "superBundles".to_owned(),
            Val::List(
                superbundles
                    .iter()
                    .map(|s| Val::Str((*s).to_owned()))
                    .collect(),
            ),
        ),
        (
            "requiredChunks".to_owned(),
            Val::List(required.iter().map(|s| Val::Str((*s).to_owned())).collect()),
        ),
    ];
    if optional {
        entries.push(("optional".to_owned(), Val::Bool(true)));
    }
    Val::Obj(entries)
}

pub fn layout_root(layer: &str, packages: Vec<Val>, shared: &[&str]) -> Val {
    layout_root_with_resources(layer, packages, shared, vec![])
}

pub fn layout_root_with_resources(
    layer: &str,
    packages: Vec<Val>,
    shared: &[&str],
    resources: Vec<Val>,
) -> Val {
    obj(&[
        ("name", Val::Str(layer.to_owned())),
        (
            "superBundles",
            Val::List(
                shared
                    .iter()
                    .map(|name| obj(&[("name", Val::Str((*name).to_owned()))]))
                    .collect(),
            ),
        ),
        (
            "installManifest",
            obj(&[("installChunks", Val::List(packages))]),
        ),
        ("chunks", Val::List(resources)),
    ])
}

// ---- filesystem helpers ------------------------------------------------

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

pub fn write_layout(root: &Path, layer: &str, layout: &Val) {
    write_file(&root.join(layer).join("layout.toc"), &toc_bytes(layout, false));
}

pub fn write_superbundle_toc(root: &Path, layer: &str, name: &str, toc: &Val) {
    write_file(
        &root.join(layer).join(format!("{name}.toc")),
        &toc_bytes(toc, true),
    );
}

pub fn write_sb(root: &Path, layer: &str, name: &str, bytes: &[u8]) {
    write_file(&root.join(layer).join(format!("{name}.sb")), bytes);
}

pub fn write_cas(root: &Path, layer: &str, install_dir: &str, index: u8, bytes: &[u8]) {
    write_file(
        &root
            .join(layer)
            .join(install_dir)
            .join(format!("cas_{index:02}.cas")),
        bytes,
    );
}

/// Route `tracing` output to the test harness, honouring `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---- extraction doubles ------------------------------------------------

/// Test stand-in for the external library: expands the first payload byte
/// to `dst_size` copies.
pub struct ByteFill;

impl Decompressor for ByteFill {
    fn decompress(
        &self,
        src: &[u8],
        dst_size: usize,
    ) -> std::result::Result<Vec<u8>, DecompressorError> {
        let byte = src
            .first()
            .copied()
            .ok_or_else(|| DecompressorError("empty payload".into()))?;
        Ok(vec![byte; dst_size])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedItem {
    pub kind: PartKind,
    pub identity: String,
    pub sha1: Sha1,
    pub bytes: Vec<u8>,
}

/// Sink collecting every delivered part for assertions.
#[derive(Default)]
pub struct CollectSink {
    items: Mutex<Vec<CollectedItem>>,
}

impl CollectSink {
    pub fn into_items(self) -> Vec<CollectedItem> {
        self.items.into_inner()
    }

    /// Items sorted by identity, for order-independent comparison.
    pub fn sorted_items(self) -> Vec<CollectedItem> {
        let mut items = self.into_items();
        items.sort_by(|a, b| a.identity.cmp(&b.identity));
        items
    }
}

impl OutputSink for CollectSink {
    fn deliver(&self, item: &ExtractedItem<'_>) -> std::io::Result<()> {
        let identity = match item.identity {
            anthem_extract::PartIdentity::Path(path) => path.to_owned(),
            anthem_extract::PartIdentity::Uid(uid) => uid.to_string(),
            anthem_extract::PartIdentity::Sha1(sha1) => sha1.to_string(),
        };
        self.items.lock().push(CollectedItem {
            kind: item.kind,
            identity,
            sha1: item.metadata.sha1,
            bytes: item.bytes.to_vec(),
        });
        Ok(())
    }
}
