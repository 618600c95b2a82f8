mod common;

use std::io::Write;

use adcp::ensemble::Ensemble;
use adcp::framing::*;
use common::{ensemble_stream, EnsembleBuilder};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn ensemble_numbers(frames: &[Frame]) -> Vec<u32> {
    frames
        .iter()
        .map(|f| Ensemble::decode(&f.data).unwrap().ensemble_number().unwrap())
        .collect()
}

fn sync_chunked(stream: &[u8], rng: &mut StdRng) -> Vec<Frame> {
    let mut sync = Synchronizer::new(SyncConfig::default());
    let mut frames = Vec::new();
    let mut rest = stream;
    while !rest.is_empty() {
        let n = rng.gen_range(0..=rest.len().min(300));
        let (chunk, tail) = rest.split_at(n);
        frames.extend(sync.push(chunk));
        rest = tail;
    }
    frames.extend(sync.finish());
    frames
}

#[test]
fn random_chunking_yields_identical_frames() {
    let mut rng = StdRng::seed_from_u64(0x7f7f);
    let stream = [vec![0x01, 0x7f, 0x33, 0x00], ensemble_stream(0, 20)].concat();

    let mut sync = Synchronizer::new(SyncConfig::default());
    let mut expected = sync.push(&stream);
    expected.extend(sync.finish());
    assert_eq!(ensemble_numbers(&expected), (0..20).collect::<Vec<u32>>());

    for _ in 0..25 {
        assert_eq!(sync_chunked(&stream, &mut rng), expected);
    }
}

#[test]
fn every_emitted_frame_is_valid() {
    let mut rng = StdRng::seed_from_u64(1);
    let frames = sync_chunked(&ensemble_stream(100, 10), &mut rng);

    assert_eq!(frames.len(), 10);
    for frame in &frames {
        assert!(frame.is_valid());
        assert_eq!(frame.integrity, Integrity::Ok);
        assert_eq!(frame.data.len(), frame.declared_len().unwrap() + CHECKSUM_LEN);
        assert!(Ensemble::decode(&frame.data).unwrap().is_valid());
    }
}

#[test]
fn noise_between_ensembles_costs_only_the_preceding_ensemble() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut stream = Vec::new();
    for n in 0..10u16 {
        stream.extend(EnsembleBuilder::default().number(n).build());
        if n == 2 || n == 5 {
            // noise without signature bytes
            let noise: Vec<u8> = (0..37).map(|_| rng.gen_range(0..0x7f)).collect();
            stream.extend(noise);
        }
    }

    let frames = sync_chunked(&stream, &mut rng);

    assert_eq!(ensemble_numbers(&frames), vec![0, 1, 3, 4, 6, 7, 8, 9]);
}

#[test]
fn signature_bytes_inside_ensemble_data() {
    let ens = EnsembleBuilder::default()
        .raw_section(vec![0x00, 0x07, 0x7f, 0x7f, 0x7f, 0x7f, 0x00, 0x00, 0x7f, 0x7f])
        .build();
    let stream = [ens.clone(), ens.clone(), ens.clone()].concat();

    let mut sync = Synchronizer::new(SyncConfig::default());
    let mut frames = sync.push(&stream);
    frames.extend(sync.finish());

    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.data == ens));
    assert_eq!(sync.stats().false_starts, 0);
}

#[test]
fn corrupted_ensemble_is_dropped() {
    let mut stream = ensemble_stream(0, 5);
    let len = EnsembleBuilder::default().build().len();
    // flip a profile byte in the third ensemble
    stream[2 * len + 200] ^= 0x55;

    let mut sync = Synchronizer::new(SyncConfig::default());
    let mut frames = sync.push(&stream);
    frames.extend(sync.finish());

    assert_eq!(ensemble_numbers(&frames), vec![0, 1, 3, 4]);
    assert_eq!(sync.stats().checksum_failures, 1);
}

#[test]
fn read_frames_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0xde, 0xad]).unwrap();
    file.write_all(&ensemble_stream(7, 4)).unwrap();
    file.flush().unwrap();

    let reader = std::fs::File::open(file.path()).unwrap();
    let frames: Vec<Frame> = read_ensemble_frames(reader, SyncConfig::default(), 100)
        .map(Result::unwrap)
        .collect();

    assert_eq!(ensemble_numbers(&frames), vec![7, 8, 9, 10]);
}

#[test]
fn delimited_records_across_random_chunks() {
    let mut rng = StdRng::seed_from_u64(3);
    let lines: Vec<String> = (0..50).map(|i| format!("# {i}.0, 3.14, {}", i * 2)).collect();
    let stream = format!("partial\r\n{}\r\n", lines.join("\r\n"));

    let mut sync = DelimitedSynchronizer::new(b"\r\n", 256).unwrap();
    let mut records = Vec::new();
    let mut rest = stream.as_bytes();
    while !rest.is_empty() {
        let n = rng.gen_range(1..=rest.len().min(17));
        let (chunk, tail) = rest.split_at(n);
        records.extend(sync.push(chunk));
        rest = tail;
    }

    let got: Vec<String> = records
        .into_iter()
        .map(|r| String::from_utf8(r).unwrap())
        .collect();
    assert_eq!(got, lines);
}
