//! Shared fixtures for integration tests: synthetic documents on disk.

#![allow(dead_code)]

use image::{GrayImage, Luma};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One occurrence of a synthetic document.
#[derive(Debug, Clone, Copy)]
pub struct Glyph {
    pub id: u32,
    pub character: &'static str,
    /// Number of inked columns from the left edge
    pub ink: u32,
}

pub fn glyph(id: u32, character: &'static str, ink: u32) -> Glyph {
    Glyph { id, character, ink }
}

pub fn bitmap_name(id: u32) -> String {
    format!("glyphs/{:04}.png", id)
}

/// 48×48 grayscale bitmap, black ink on white paper.
pub fn render(ink: u32) -> GrayImage {
    GrayImage::from_fn(48, 48, |x, y| {
        if x < ink * 2 && y % 7 != 0 { Luma([0]) } else { Luma([255]) }
    })
}

pub fn crop_box(id: u32) -> [f64; 4] {
    let x0 = f64::from(id % 10) * 100.0;
    let y0 = f64::from(id / 10) * 120.0;
    [x0, y0, x0 + 80.0, y0 + 90.0]
}

/// Write `index.json` plus one PNG per glyph into a fresh directory.
pub fn write_document(glyphs: &[Glyph]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("glyphs")).unwrap();

    for g in glyphs {
        render(g.ink).save(dir.path().join(bitmap_name(g.id))).unwrap();
    }

    let index_path = dir.path().join("index.json");
    write_index(&index_path, glyphs);
    (dir, index_path)
}

pub fn write_index(path: &Path, glyphs: &[Glyph]) {
    let files: Vec<_> = glyphs
        .iter()
        .map(|g| {
            json!({
                "index": g.id,
                "char": g.character,
                "codepoint": format!("U+{:04X}", g.character.chars().next().map(u32::from).unwrap_or(0)),
                "file": bitmap_name(g.id),
                "source": {
                    "image": "page_00.jpg",
                    "image_index": 0,
                    "grid": { "col": g.id % 10, "row": g.id / 10 },
                    "crop_box": crop_box(g.id),
                    "recognition": { "char": g.character, "confidence": 0.9 }
                }
            })
        })
        .collect();

    let document = json!({
        "name": "兰亭集序",
        "total_chars": glyphs.len(),
        "files": files,
    });
    std::fs::write(path, serde_json::to_vec_pretty(&document).unwrap()).unwrap();
}

/// Four occurrences of 之 in two visual variants, plus a singleton 和.
pub fn two_variant_document() -> (TempDir, PathBuf) {
    write_document(&[
        glyph(1, "之", 4),
        glyph(2, "之", 5),
        glyph(3, "之", 18),
        glyph(4, "之", 19),
        glyph(5, "和", 10),
    ])
}
