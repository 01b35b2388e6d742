mod common;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use common::{resolved, write_source, CountingTranslator, FakeBackend, ADD_VECTORS};
use kiln_build::{BuildContext, BuildError, BuildPipeline};
use kiln_cache::{list_locks, ArtifactKind, BuildLocks, TRANSLATION_DEPTH};
use kiln_common::Digest;
use kiln_config::BackendKind;
use kiln_device::{Device, DeviceBackend, DeviceError};
use kiln_translate::{BuildFlags, KernelSourceTranslator, MarkerTranslator};

fn context(root: &Path) -> BuildContext {
    BuildContext::new(root, resolved(BackendKind::Serial, "g++", "-g"))
}

fn pipeline(root: &Path, translator: Arc<dyn KernelSourceTranslator>) -> BuildPipeline {
    BuildPipeline::new(&context(root), translator)
}

#[test]
fn repeated_builds_reuse_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let translator = Arc::new(CountingTranslator::new(Duration::ZERO));
    let compiles = Arc::new(AtomicUsize::new(0));
    let flags = BuildFlags::new();

    let first = {
        let p = pipeline(dir.path(), translator.clone());
        let mut backend = FakeBackend::serial(compiles.clone());
        p.build_kernel(&src, "addVectors", &flags, &mut backend).unwrap()
    };
    let p = pipeline(dir.path(), translator.clone());
    let mut backend = FakeBackend::serial(compiles.clone());
    let digest = p.digest_for(&src, &flags, &backend).unwrap();
    let source_before = p.store().get(&digest, ArtifactKind::Source).unwrap().unwrap();
    let second = p.build_kernel(&src, "addVectors", &flags, &mut backend).unwrap();
    let source_after = p.store().get(&digest, ArtifactKind::Source).unwrap().unwrap();

    assert_eq!(translator.calls(), 1);
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
    assert_eq!(first.binary_path(), second.binary_path());
    assert_eq!(source_before, source_after);
    assert!(first.binary_path().starts_with(p.store().entry_dir(&digest)));
    assert_eq!(second.function(), "addVectors");
    assert_eq!(second.args().len(), 4);
    assert_eq!(second.entry_symbol(), "__kiln_launch_addVectors");
    assert_eq!(second.device(), backend.id());
}

#[test]
fn every_salt_component_changes_the_digest() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let other_src = write_source(dir.path(), "add2.c", &ADD_VECTORS.replace("+", "-"));
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let counter = Arc::new(AtomicUsize::new(0));
    let plain = BuildFlags::new();
    let defined = BuildFlags::new().define("TILE", "16");

    let backend = |kind, compiler: &str, flags: &str| {
        FakeBackend::new(&resolved(kind, compiler, flags), counter.clone())
    };
    let mut with_script = resolved(BackendKind::Serial, "g++", "-g");
    with_script.compiler_env_script = "source /opt/env.sh".to_string();
    let mut with_vendor = resolved(BackendKind::Serial, "g++", "-g");
    with_vendor.vendor_hint = "sm_80".to_string();

    let base = backend(BackendKind::Serial, "g++", "-g");
    let digests = vec![
        p.digest_for(&src, &plain, &base).unwrap(),
        p.digest_for(&src, &plain, &backend(BackendKind::Serial, "g++", "-O2")).unwrap(),
        p.digest_for(&src, &plain, &backend(BackendKind::Serial, "clang++", "-g")).unwrap(),
        p.digest_for(&src, &plain, &backend(BackendKind::Accelerator, "g++", "-g")).unwrap(),
        p.digest_for(&src, &defined, &base).unwrap(),
        p.digest_for(&other_src, &plain, &base).unwrap(),
        p.digest_for(&src, &plain, &FakeBackend::new(&with_script, counter.clone())).unwrap(),
        p.digest_for(&src, &plain, &FakeBackend::new(&with_vendor, counter.clone())).unwrap(),
    ];
    let unique: HashSet<Digest> = digests.iter().copied().collect();
    assert_eq!(unique.len(), digests.len(), "{digests:?}");

    // Same inputs on a different device instance give the same key.
    assert_eq!(
        digests[0],
        p.digest_for(&src, &plain, &backend(BackendKind::Serial, "g++", "-g")).unwrap()
    );
}

#[test]
fn literal_cache_key_layout() {
    let dir = tempfile::tempdir().unwrap();
    let source = b"@kernel void k(int n) {}\n";
    let src = dir.path().join("k.c");
    std::fs::write(&src, source).unwrap();

    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));
    let salt = p.salt_for(source, &BuildFlags::new(), &backend);

    let mut expected = b"Serial|v3|g++|-g|".to_vec();
    expected.extend_from_slice(source);
    assert_eq!(salt.as_bytes(), expected.as_slice());
    assert_eq!(salt.digest(), Digest::of(&expected));
    assert_eq!(
        p.digest_for(&src, &BuildFlags::new(), &backend).unwrap(),
        Digest::of(&expected)
    );
}

#[test]
fn concurrent_builders_translate_once() {
    const BUILDERS: usize = 6;
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let translator = Arc::new(CountingTranslator::new(Duration::from_millis(150)));
    let compiles = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(BUILDERS));

    let handles: Vec<_> = (0..BUILDERS)
        .map(|_| {
            let root = dir.path().to_path_buf();
            let src = src.clone();
            let translator = translator.clone();
            let compiles = compiles.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                // Separate pipelines share nothing but the cache directory.
                let p = pipeline(&root, translator);
                let mut backend = FakeBackend::serial(compiles);
                barrier.wait();
                let kernel = p
                    .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
                    .unwrap();
                assert!(p.locks().held().is_empty());
                kernel.binary_path().to_path_buf()
            })
        })
        .collect();

    let paths: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(translator.calls(), 1);
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert!(list_locks(dir.path()).unwrap().is_empty());
}

#[test]
fn missing_function_is_translation_error_and_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));

    for _ in 0..2 {
        match p.build_kernel(&src, "subVectors", &BuildFlags::new(), &mut backend) {
            Err(BuildError::Translation {
                function,
                source_path,
                ..
            }) => {
                assert_eq!(function, "subVectors");
                assert_eq!(source_path, src);
            }
            other => panic!("expected translation error, got {other:?}"),
        }
        assert!(list_locks(dir.path()).unwrap().is_empty());
    }
    let digest = p.digest_for(&src, &BuildFlags::new(), &backend).unwrap();
    assert!(!p.store().contains(&digest, ArtifactKind::Source).unwrap());
}

#[test]
fn function_absent_from_cached_entry_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));

    p.build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap();
    let err = p
        .build_kernel(&src, "mulVectors", &BuildFlags::new(), &mut backend)
        .unwrap_err();
    assert!(
        matches!(&err, BuildError::NotFound { function, .. } if function == "mulVectors"),
        "{err}"
    );
}

#[test]
fn compile_failure_carries_diagnostics_and_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let compiles = Arc::new(AtomicUsize::new(0));
    let mut backend = FakeBackend::serial(compiles.clone());
    backend.fail_compile = true;

    match p.build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend) {
        Err(BuildError::Compile {
            diagnostics,
            flags,
            function,
            ..
        }) => {
            assert!(diagnostics.contains("fake failure"));
            assert_eq!(flags, "-g");
            assert_eq!(function, "addVectors");
        }
        other => panic!("expected compile error, got {other:?}"),
    }
    assert!(list_locks(dir.path()).unwrap().is_empty());
    let digest = p.digest_for(&src, &BuildFlags::new(), &backend).unwrap();
    assert!(p.store().contains(&digest, ArtifactKind::Source).unwrap());
    assert!(!p.store().contains(&digest, ArtifactKind::Binary).unwrap());

    backend.fail_compile = false;
    p.build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 2);
}

#[test]
fn corrupted_binary_is_an_error_not_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let compiles = Arc::new(AtomicUsize::new(0));
    let mut backend = FakeBackend::serial(compiles.clone());

    let kernel = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap();
    std::fs::write(kernel.binary_path(), b"FAKEBIN\0tampered").unwrap();

    let err = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap_err();
    assert!(matches!(err, BuildError::CacheIo(_)), "{err}");
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
}

#[test]
fn unreadable_source_is_cache_io() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));
    let err = p
        .build_kernel(
            &dir.path().join("missing.c"),
            "addVectors",
            &BuildFlags::new(),
            &mut backend,
        )
        .unwrap_err();
    assert!(matches!(err, BuildError::CacheIo(_)), "{err}");
}

#[test]
fn non_utf8_source_is_translation_error() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("bad.c");
    std::fs::write(&src, b"@kernel void k() {}\n\xff\xfe").unwrap();
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));
    let err = p
        .build_kernel(&src, "k", &BuildFlags::new(), &mut backend)
        .unwrap_err();
    assert!(matches!(err, BuildError::Translation { .. }), "{err}");
}

#[test]
fn bounded_wait_times_out_without_touching_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let ctx = context(dir.path()).with_lock_timeout(Duration::from_millis(50));
    let p = BuildPipeline::new(&ctx, Arc::new(MarkerTranslator::new()));
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));
    let digest = p.digest_for(&src, &BuildFlags::new(), &backend).unwrap();

    // A builder in another "process" holds the translation lock.
    let other = BuildLocks::new(dir.path());
    assert!(other.acquire(&digest, TRANSLATION_DEPTH).unwrap());

    let err = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap_err();
    assert!(matches!(err, BuildError::LockTimeout { .. }), "{err}");
    assert!(other.is_locked(&digest, TRANSLATION_DEPTH).unwrap());

    other.release(&digest, TRANSLATION_DEPTH).unwrap();
    p.build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap();
}

#[test]
fn waiter_takes_over_when_holder_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let p = pipeline(dir.path(), Arc::new(MarkerTranslator::new()));
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));
    let digest = p.digest_for(&src, &BuildFlags::new(), &backend).unwrap();

    let other = Arc::new(BuildLocks::new(dir.path()));
    assert!(other.acquire(&digest, TRANSLATION_DEPTH).unwrap());
    let releaser = {
        let other = other.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            other.release(&digest, TRANSLATION_DEPTH).unwrap();
        })
    };

    let kernel = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap();
    releaser.join().unwrap();
    assert!(kernel.binary_path().exists());
}

#[test]
fn prebuilt_binary_loads_without_hashing() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let translator = Arc::new(CountingTranslator::new(Duration::ZERO));
    let p = pipeline(dir.path(), translator.clone());
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));

    let built = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap();
    let loaded = p
        .build_kernel_from_binary(built.binary_path(), "addVectors", &mut backend)
        .unwrap();
    assert_eq!(loaded.binary_path(), built.binary_path());
    assert_eq!(loaded.args(), built.args());
    assert_eq!(translator.calls(), 1);

    let err = p
        .build_kernel_from_binary(built.binary_path(), "nope", &mut backend)
        .unwrap_err();
    assert!(matches!(err, BuildError::NotFound { .. }));
}

#[test]
fn freed_device_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let translator = Arc::new(CountingTranslator::new(Duration::ZERO));
    let p = pipeline(dir.path(), translator.clone());
    let mut backend = FakeBackend::serial(Arc::new(AtomicUsize::new(0)));
    backend.free();
    let err = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut backend)
        .unwrap_err();
    assert!(matches!(err, BuildError::Device(DeviceError::Freed)), "{err}");
    assert!(list_locks(dir.path()).unwrap().is_empty());
    assert_eq!(translator.calls(), 0);
    assert!(!dir.path().join("kernels").exists());
}

#[test]
fn native_build_and_launch() {
    let compiler = kiln_config::default_compiler();
    if cfg!(windows) || !kiln_device::toolchain::compiler_available(compiler) {
        eprintln!("native compiler not available, skipping test.");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "add.c", ADD_VECTORS);
    let ctx = BuildContext::new(dir.path(), resolved(BackendKind::Serial, compiler, "-O1"));
    let p = BuildPipeline::new(&ctx, Arc::new(MarkerTranslator::new()));
    let mut device: Device = ctx.open_device();

    let kernel = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut device)
        .unwrap();

    let mut entries: i32 = 3;
    let mut a = [1.0f32, 2.0, 3.0];
    let mut b = [10.0f32, 20.0, 30.0];
    let mut ab = [0.0f32; 3];
    let mut args = [
        &mut entries as *mut i32 as *mut std::ffi::c_void,
        a.as_mut_ptr().cast(),
        b.as_mut_ptr().cast(),
        ab.as_mut_ptr().cast(),
    ];
    unsafe { kernel.launch(&mut args).unwrap() };
    assert_eq!(ab, [11.0, 22.0, 33.0]);

    // A second device with the same identity hits the cache.
    let mut again = ctx.open_device();
    let cached = p
        .build_kernel(&src, "addVectors", &BuildFlags::new(), &mut again)
        .unwrap();
    assert_eq!(cached.binary_path(), kernel.binary_path());
}
