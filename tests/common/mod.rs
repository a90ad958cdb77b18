#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Build a gzipped chart archive with `<dir>/Chart.yaml` plus extra files.
pub fn build_chart_tgz(chart_yaml: &str, chart_dir: &str, extra_files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    append_file(
        &mut builder,
        &format!("{chart_dir}/Chart.yaml"),
        chart_yaml.as_bytes(),
    );
    for (path, content) in extra_files {
        append_file(
            &mut builder,
            &format!("{chart_dir}/{path}"),
            content.as_bytes(),
        );
    }
    let tar_data = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_data).unwrap();
    encoder.finish().unwrap()
}

fn append_file(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

/// Decode a gzipped archive into (path, bytes) pairs in entry order.
pub fn read_entries(tgz: &[u8]) -> Vec<(String, Vec<u8>)> {
    let gz = flate2::read::GzDecoder::new(tgz);
    let mut archive = tar::Archive::new(gz);
    let mut out = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.push((path, data));
    }
    out
}
