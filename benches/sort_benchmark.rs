//! Rewrite throughput on synthetic files held in memory.
//!
//! Run with: cargo bench --bench sort_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mdf_sorter::{SliceReader, SortConfig, Sorter, VecWriter, ZipDirection};

const RECORD_LEN: usize = 16;
const RECORDS: usize = 256 * 1024;

fn block(file: &mut Vec<u8>, tag: &str, links: &[u64], body: &[u8]) -> u64 {
    while file.len() % 8 != 0 {
        file.push(0);
    }
    let address = file.len() as u64;
    file.extend_from_slice(tag.as_bytes());
    file.extend_from_slice(&[0; 4]);
    file.extend_from_slice(&((24 + 8 * links.len() + body.len()) as u64).to_le_bytes());
    file.extend_from_slice(&(links.len() as u64).to_le_bytes());
    for link in links {
        file.extend_from_slice(&link.to_le_bytes());
    }
    file.extend_from_slice(body);
    address
}

/// HD -> DG -> CG -> DT with 4 MiB of records.
fn plain_file() -> Vec<u8> {
    let mut file = vec![0u8; 64];
    file[0..8].copy_from_slice(b"MDF     ");
    file[8..16].copy_from_slice(b"4.10    ");
    file[28..30].copy_from_slice(&410u16.to_le_bytes());

    let hd_at = 64 + 24;
    block(&mut file, "##HD", &[0; 6], &[0; 32]);
    let dg_links_at = file.len() + 24;
    block(&mut file, "##DG", &[0; 4], &[0; 8]);

    let mut cg_body = vec![0u8; 32];
    cg_body[8..16].copy_from_slice(&(RECORDS as u64).to_le_bytes());
    cg_body[24..28].copy_from_slice(&(RECORD_LEN as u32).to_le_bytes());
    let cg = block(&mut file, "##CG", &[0; 6], &cg_body);

    let data: Vec<u8> = (0..RECORDS * RECORD_LEN).map(|i| (i / 7) as u8).collect();
    let dt = block(&mut file, "##DT", &[], &data);

    let dg = (dg_links_at - 24) as u64;
    file[hd_at..hd_at + 8].copy_from_slice(&dg.to_le_bytes());
    file[dg_links_at + 8..dg_links_at + 16].copy_from_slice(&cg.to_le_bytes());
    file[dg_links_at + 16..dg_links_at + 24].copy_from_slice(&dt.to_le_bytes());
    file
}

fn rewrite(input: &[u8], config: &SortConfig) -> Vec<u8> {
    let sorter = Sorter::from_reader(SliceReader::new(input.to_vec()), config.clone()).unwrap();
    let (writer, _) = sorter.write_to(VecWriter::new()).unwrap();
    writer.into_inner()
}

fn bench_rewrites(c: &mut Criterion) {
    let plain = plain_file();
    let zip = SortConfig::default().with_zip(ZipDirection::Zip);
    let unzip = SortConfig::default();
    let zipped = rewrite(&plain, &zip);

    c.bench_function("zip_4mb", |b| b.iter(|| rewrite(black_box(&plain), &zip)));
    c.bench_function("unzip_4mb", |b| b.iter(|| rewrite(black_box(&zipped), &unzip)));
    c.bench_function("rechunk_4mb_64k_blocks", |b| {
        let small = SortConfig::default()
            .with_max_block_size(64 * 1024)
            .with_override_size(true);
        let chunked = rewrite(&plain, &zip.clone().with_max_block_size(64 * 1024));
        b.iter(|| rewrite(black_box(&chunked), &small))
    });
}

criterion_group!(benches, bench_rewrites);
criterion_main!(benches);
