use std::fs;
use std::path::Path;
use std::sync::Arc;

use oremine_core::{scan, CancelToken, ProgressFn, ProgressSnapshot, ScanConfig};
use parking_lot::Mutex;

/// Flag-2 ALAR archive: 16-byte records, each name stored 0x22 bytes before
/// its member data.
fn build_alar(members: &[(&str, &[u8])]) -> Vec<u8> {
    const HEADER_LEN: usize = 0x10;
    const NAME_FIELD: usize = 0x22;

    let mut cursor = HEADER_LEN + members.len() * 16;
    let mut data_offsets = Vec::new();
    for (_, payload) in members {
        let data_at = cursor + NAME_FIELD;
        data_offsets.push(data_at);
        cursor = data_at + payload.len();
    }

    let mut out = b"ALAR".to_vec();
    out.extend_from_slice(&[2, 0]);
    out.extend_from_slice(&(members.len() as u16).to_be_bytes());
    out.resize(HEADER_LEN, 0);
    for ((_, payload), &data_at) in members.iter().zip(&data_offsets) {
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(data_at as u32).to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
    }
    for (name, payload) in members {
        let mut field = name.as_bytes().to_vec();
        field.resize(NAME_FIELD, 0);
        out.extend_from_slice(&field);
        out.extend_from_slice(payload);
    }
    out
}

/// Yaz0 stream made only of literal groups.
fn build_yaz0(payload: &[u8]) -> Vec<u8> {
    let mut out = b"Yaz0".to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0; 8]);
    for chunk in payload.chunks(8) {
        out.push(0xFF);
        out.extend_from_slice(chunk);
    }
    out
}

fn png(tag: &str) -> Vec<u8> {
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    out.extend_from_slice(tag.as_bytes());
    out
}

fn recorder() -> (Arc<ProgressFn>, Arc<Mutex<Vec<ProgressSnapshot>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: Arc<ProgressFn> = Arc::new(move |s: &ProgressSnapshot| sink.lock().push(*s));
    (callback, seen)
}

fn serial() -> ScanConfig {
    ScanConfig {
        debug_serial: true,
        fail_fast: false,
        ..ScanConfig::default()
    }
}

fn log_text(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_container_progress_sequence() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let (m1, m2, m3) = (png("first"), png("second member"), png("third member payload"));
    let archive = build_alar(&[("tex/a.png", &m1), ("tex/b.png", &m2), ("c.png", &m3)]);
    let file_len = archive.len() as u64;
    fs::write(input.path().join("pack.alar"), &archive).unwrap();

    let (callback, seen) = recorder();
    let config = ScanConfig {
        progress: Some(callback),
        ..serial()
    };
    let results = scan(input.path(), output.path(), config).unwrap();

    let (l1, l2, l3) = (m1.len() as u64, m2.len() as u64, m3.len() as u64);
    let seen = seen.lock();
    let bytes: Vec<u64> = seen.iter().map(|s| s.processed_bytes).collect();
    assert_eq!(bytes, vec![0, l1, l1 + l2, l1 + l2 + l3, file_len, file_len]);
    assert!(seen.last().unwrap().is_final);
    assert_eq!(seen[3].processed_files, 0);
    assert_eq!(seen[4].processed_files, 1);

    // three members and no hidden payloads after them
    assert_eq!(results.tasks_processed, 4);
    assert_eq!(results.dispositions.expanded, 1);
    assert_eq!(results.dispositions.persisted, 3);
    assert_eq!(results.dispositions.total(), results.tasks_processed);
    assert_eq!(fs::read(output.path().join("pack/tex/b.png")).unwrap(), m2);
    assert_eq!(fs::read(output.path().join("pack/c.png")).unwrap(), m3);
}

#[test]
fn test_small_unknown_member_is_logged_and_copied() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let blob: Vec<u8> = (0xA0u8..0xC8).collect();
    assert_eq!(blob.len(), 40);
    fs::write(input.path().join("pack.alar"), build_alar(&[("blob.zzz", &blob)])).unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    assert_eq!(results.dispositions.unknown, 1);
    assert_eq!(fs::read(output.path().join("pack/blob.zzz")).unwrap(), blob);

    let text = log_text(results.log_path.as_deref().unwrap());
    assert!(text.contains("Unknown: pack/blob.zzz"));
    assert!(text.contains(&format!("Bytes32:[{}]", hex::encode_upper(&blob[..32]))));
}

#[test]
fn test_extensionless_unknown_members() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let blob: Vec<u8> = (0xA0u8..0xC8).collect();
    let tiny: Vec<u8> = (0xD0u8..0xE4).collect();
    fs::write(
        input.path().join("pack.alar"),
        build_alar(&[("blob", &blob), ("tiny", &tiny)]),
    )
    .unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    assert_eq!(results.dispositions.unknown, 2);
    assert_eq!(fs::read(output.path().join("pack/blob")).unwrap(), blob);
    assert_eq!(fs::read(output.path().join("pack/tiny")).unwrap(), tiny);

    let text = log_text(results.log_path.as_deref().unwrap());
    assert!(text.contains("Unknown: pack/blob"));
    assert!(text.contains(&format!("Bytes32:[{}]", hex::encode_upper(&blob[..32]))));
    // shorter streams show every byte they have
    assert!(text.contains(&format!("Bytes32:[{}]", hex::encode_upper(&tiny))));
}

#[test]
fn test_unsupported_root_archive_is_copied() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut rarc = b"RARC".to_vec();
    rarc.extend_from_slice(&[0u8; 60]);
    fs::write(input.path().join("map.rarc"), &rarc).unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    assert_eq!(results.dispositions.unsupported, 1);
    assert_eq!(fs::read(output.path().join("map.arc")).unwrap(), rarc);
    assert!(log_text(results.log_path.as_deref().unwrap()).contains("Unsupported: map.rarc"));
}

#[test]
fn test_codec_stream_replaced_at_same_path() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let payload = png("decoded model texture");
    fs::write(input.path().join("model.szs"), build_yaz0(&payload)).unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    assert_eq!(results.tasks_processed, 2);
    assert_eq!(results.dispositions.expanded, 1);
    assert_eq!(results.dispositions.persisted, 1);
    // decoded payload lands where the compressed file was, with its own extension
    assert_eq!(fs::read(output.path().join("model.png")).unwrap(), payload);
    assert!(!output.path().join("model.szs").exists());
}

#[test]
fn test_hidden_container_after_last_member() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let outer = build_alar(&[("a.png", &png("outer"))]);
    let inner = build_alar(&[("b.png", &png("appended"))]);
    let hidden_at = outer.len();
    let mut raw = outer;
    raw.extend_from_slice(&inner);
    fs::write(input.path().join("pack.alar"), raw).unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    // pack, a.png, hidden ALAR, b.png
    assert_eq!(results.tasks_processed, 4);
    assert_eq!(results.dispositions.expanded, 2);
    assert!(output.path().join("pack/a.png").exists());
    assert!(output
        .path()
        .join(format!("pack/{hidden_at:08X}/b.png"))
        .exists());
}

#[test]
fn test_cut_backoff_on_repeated_unknown_format() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..6 {
        let noise = format!("noise block {i} ").repeat(8);
        fs::write(input.path().join(format!("n{i}.dat")), noise).unwrap();
    }

    let config = ScanConfig {
        force: true,
        ..serial()
    };
    let results = scan(input.path(), output.path(), config).unwrap();
    assert_eq!(results.recovery.cascade_hits, 0);
    // the fifth cut still runs after four misses; only the sixth is skipped
    assert_eq!(results.recovery.cuts_attempted, 5);
    assert_eq!(results.recovery.cuts_skipped, 1);
    assert_eq!(results.recovery.cuts_succeeded, 0);
    assert_eq!(results.dispositions.unknown, 6);
    // depth-0 unknowns stay where they are
    assert!(!output.path().join("n0.dat").exists());
}

#[test]
fn test_force_cut_recovers_embedded_stream() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut raw = b"header garbage ".to_vec();
    // member text carries no signature, so the only cut point is the ALAR header
    let embedded = build_alar(&[("x.txt", b"embedded text")]);
    let embedded_at = raw.len();
    raw.extend_from_slice(&embedded);
    fs::write(input.path().join("blob.bin"), raw).unwrap();

    let config = ScanConfig {
        force: true,
        ..serial()
    };
    let results = scan(input.path(), output.path(), config).unwrap();
    assert_eq!(results.recovery.cuts_succeeded, 1);
    assert!(output
        .path()
        .join(format!("blob/{embedded_at:08X}/x.txt"))
        .exists());
}

#[test]
fn test_persist_root_copies_input_leaves() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::create_dir_all(input.path().join("gfx")).unwrap();
    fs::write(input.path().join("gfx/title.png"), png("title")).unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    assert_eq!(results.dispositions.in_place, 1);
    assert!(!output.path().join("gfx/title.png").exists());

    let config = ScanConfig {
        persist_root: true,
        ..serial()
    };
    let results = scan(input.path(), output.path(), config).unwrap();
    assert_eq!(results.dispositions.persisted, 1);
    assert_eq!(fs::read(output.path().join("gfx/title.png")).unwrap(), png("title"));
}

#[test]
fn test_depth_limit() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let inner = build_alar(&[("deep.png", &png("deep"))]);
    fs::write(input.path().join("pack.alar"), build_alar(&[("inner.alar", &inner)])).unwrap();

    let config = ScanConfig {
        max_depth: 1,
        ..serial()
    };
    let results = scan(input.path(), output.path(), config).unwrap();
    assert_eq!(results.dispositions.depth_limited, 1);
    assert!(output.path().join("pack/inner/deep.png").exists());
    assert!(log_text(results.log_path.as_deref().unwrap()).contains("DepthLimit: pack/inner/deep.png"));
}

#[test]
fn test_fail_fast_returns_first_error() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut broken = build_alar(&[("a.png", &png("a"))]);
    broken[4] = 7;
    fs::write(input.path().join("broken.alar"), &broken).unwrap();

    let results = scan(input.path(), output.path(), serial()).unwrap();
    assert_eq!(results.dispositions.failed, 1);
    assert!(log_text(results.log_path.as_deref().unwrap()).contains("Exception: broken.alar"));

    let config = ScanConfig {
        fail_fast: true,
        ..serial()
    };
    let err = scan(input.path(), output.path(), config).unwrap_err();
    assert!(format!("{err:#}").contains("unsupported table layout"));
}

#[test]
fn test_cancel_stops_dispatch() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..5 {
        fs::write(input.path().join(format!("f{i}.png")), png("x")).unwrap();
    }

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let callback: Arc<ProgressFn> = Arc::new(move |s: &ProgressSnapshot| {
        if s.processed_files >= 1 {
            trigger.cancel();
        }
    });
    let config = ScanConfig {
        progress: Some(callback),
        cancel,
        ..serial()
    };
    let results = scan(input.path(), output.path(), config).unwrap();
    assert!(results.cancelled);
    assert_eq!(results.processed_files, 1);
    assert_eq!(results.tasks_processed, 1);
    assert_eq!(results.total_files, 5);
}

#[test]
fn test_parallel_progress_invariants() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..6 {
        let members: Vec<(String, Vec<u8>)> = (0..4)
            .map(|j| (format!("m{j}.png"), png(&format!("{i}-{j}").repeat(j + 1))))
            .collect();
        let refs: Vec<(&str, &[u8])> = members.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
        fs::write(input.path().join(format!("p{i}.alar")), build_alar(&refs)).unwrap();
        fs::write(input.path().join(format!("u{i}.bin")), vec![i as u8; 64]).unwrap();
    }

    let (callback, seen) = recorder();
    let config = ScanConfig {
        max_parallelism: 4,
        progress: Some(callback),
        fail_fast: false,
        ..ScanConfig::default()
    };
    let results = scan(input.path(), output.path(), config).unwrap();

    let seen = seen.lock();
    for pair in seen.windows(2) {
        assert!(pair[1].processed_bytes >= pair[0].processed_bytes);
        assert!(pair[1].processed_files >= pair[0].processed_files);
    }
    for s in seen.iter() {
        assert!(s.processed_files <= s.total_files);
        assert!(s.processed_bytes <= s.total_bytes);
    }
    let last = seen.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.processed_files, 12);
    assert_eq!(last.processed_bytes, last.total_bytes);

    assert_eq!(results.tasks_processed, 12 + 6 * 4);
    assert_eq!(results.dispositions.total(), results.tasks_processed);
    assert_eq!(results.dispositions.persisted, 24);
}
