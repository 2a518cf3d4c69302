#![allow(dead_code)]

use std::fs;
use std::path::Path;

use detconv::ir::{Annotation, BBoxXYWH, Category, Dataset, Image};

pub const SAMPLE_COCO: &str = "tests/fixtures/sample_valid.coco.json";

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// Writes one VOC annotation file; objects are `(name, [xmin, ymin, xmax, ymax])`.
pub fn write_voc_xml(
    dir: &Path,
    file_name: &str,
    size: (u32, u32),
    objects: &[(&str, [f64; 4])],
) {
    let mut xml = format!(
        "<annotation>\n  <filename>{file_name}</filename>\n  <size>\n    <width>{}</width>\n    <height>{}</height>\n    <depth>3</depth>\n  </size>\n",
        size.0, size.1
    );
    for (name, [xmin, ymin, xmax, ymax]) in objects {
        xml.push_str(&format!(
            "  <object>\n    <name>{name}</name>\n    <bndbox>\n      <xmin>{xmin}</xmin>\n      <ymin>{ymin}</ymin>\n      <xmax>{xmax}</xmax>\n      <ymax>{ymax}</ymax>\n    </bndbox>\n  </object>\n"
        ));
    }
    xml.push_str("</annotation>\n");

    fs::create_dir_all(dir).expect("create voc dir");
    let stem = Path::new(file_name)
        .file_stem()
        .expect("file stem")
        .to_string_lossy()
        .to_string();
    fs::write(dir.join(format!("{stem}.xml")), xml).expect("write voc xml");
}

/// Two categories, three images (one without boxes), integer boxes.
pub fn sample_dataset() -> Dataset {
    Dataset {
        categories: vec![Category::new(0u64, "person"), Category::new(1u64, "car")],
        images: vec![
            Image::new(1u64, "street.jpg", 640, 480),
            Image::new(2u64, "park.jpg", 100, 200),
            Image::new(3u64, "empty.jpg", 50, 50),
        ],
        annotations: vec![
            Annotation::new(1u64, 1u64, 0u64, BBoxXYWH::new(10.0, 20.0, 90.0, 180.0)),
            Annotation::new(2u64, 1u64, 1u64, BBoxXYWH::new(300.0, 200.0, 250.0, 120.0)),
            Annotation::new(3u64, 2u64, 0u64, BBoxXYWH::new(10.0, 20.0, 30.0, 40.0)),
        ],
    }
}
