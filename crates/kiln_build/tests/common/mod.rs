//! Test doubles shared by the pipeline tests.

#![allow(dead_code)]

use std::ffi::c_void;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiln_config::{BackendKind, ResolvedDevice};
use kiln_device::{
    Device, DeviceBackend, DeviceError, DeviceId, DeviceIdentity, Kernel, KernelEntry,
    LoadedKernel, Memory, Stream, StreamTag,
};
use kiln_translate::{
    FunctionInfo, KernelSourceTranslator, MarkerTranslator, Translation, TranslateError,
    TranslationRequest,
};

pub const ADD_VECTORS: &str = "@kernel void addVectors(const int entries, const float *a, const float *b, float *ab) {\n  for (int i = 0; i < entries; ++i) ab[i] = a[i] + b[i];\n}\n";

pub fn resolved(backend: BackendKind, compiler: &str, flags: &str) -> ResolvedDevice {
    ResolvedDevice {
        backend,
        compiler: compiler.to_string(),
        compiler_flags: flags.to_string(),
        compiler_env_script: String::new(),
        vendor_hint: String::new(),
        threads: None,
    }
}

pub fn write_source(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Wraps the marker translator, counting calls and optionally stalling.
pub struct CountingTranslator {
    inner: MarkerTranslator,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl CountingTranslator {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MarkerTranslator::new(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KernelSourceTranslator for CountingTranslator {
    fn version(&self) -> &str {
        self.inner.version()
    }

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<Translation, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.translate(request)
    }
}

#[derive(Debug)]
pub struct FakeEntry {
    symbol: String,
}

impl KernelEntry for FakeEntry {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    unsafe fn call(&self, _args: &mut [*mut c_void]) {}
}

/// A device whose "compiler" writes a fake binary and whose loader never
/// touches the dynamic linker. Everything else is a real serial device.
pub struct FakeBackend {
    inner: Device,
    pub compiles: Arc<AtomicUsize>,
    pub fail_compile: bool,
}

impl FakeBackend {
    pub fn new(resolved: &ResolvedDevice, compiles: Arc<AtomicUsize>) -> Self {
        Self {
            inner: Device::open(resolved),
            compiles,
            fail_compile: false,
        }
    }

    pub fn serial(compiles: Arc<AtomicUsize>) -> Self {
        Self::new(&resolved(BackendKind::Serial, "g++", "-g"), compiles)
    }
}

impl DeviceBackend for FakeBackend {
    fn id(&self) -> DeviceId {
        self.inner.id()
    }

    fn identity(&self) -> &DeviceIdentity {
        self.inner.identity()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn compile(&mut self, source: &Path, output: &Path) -> Result<(), DeviceError> {
        if !self.inner.is_open() {
            return Err(DeviceError::Freed);
        }
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if self.fail_compile {
            return Err(DeviceError::Compile {
                source_path: source.to_path_buf(),
                command: "fake-cc".to_string(),
                diagnostics: "source.c:1:1: error: fake failure".to_string(),
            });
        }
        std::thread::sleep(Duration::from_millis(20));
        let mut bytes = b"FAKEBIN\0".to_vec();
        bytes.extend(std::fs::read(source).unwrap());
        std::fs::write(output, bytes).unwrap();
        Ok(())
    }

    fn load_binary(
        &mut self,
        path: &Path,
        _function: &str,
        info: &FunctionInfo,
    ) -> Result<LoadedKernel, DeviceError> {
        let bytes = std::fs::read(path).map_err(|e| DeviceError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        assert!(bytes.starts_with(b"FAKEBIN\0"));
        Ok(LoadedKernel {
            entry: Arc::new(FakeEntry {
                symbol: info.entry.clone(),
            }),
            args: info.args.clone(),
        })
    }

    fn free_kernel(&mut self, kernel: Kernel) -> Result<(), DeviceError> {
        self.inner.free_kernel(kernel)
    }

    fn allocate(&mut self, bytes: usize, src: Option<&[u8]>) -> Result<Memory, DeviceError> {
        self.inner.allocate(bytes, src)
    }

    fn mapped_alloc(&mut self, bytes: usize, src: Option<&[u8]>) -> Result<Memory, DeviceError> {
        self.inner.mapped_alloc(bytes, src)
    }

    unsafe fn wrap_memory(&mut self, handle: *mut u8, bytes: usize) -> Result<Memory, DeviceError> {
        self.inner.wrap_memory(handle, bytes)
    }

    fn free_memory(&mut self, memory: Memory) -> Result<(), DeviceError> {
        self.inner.free_memory(memory)
    }

    fn bytes_allocated(&self) -> usize {
        self.inner.bytes_allocated()
    }

    fn create_stream(&mut self) -> Result<Stream, DeviceError> {
        self.inner.create_stream()
    }

    fn free_stream(&mut self, stream: Stream) -> Result<(), DeviceError> {
        self.inner.free_stream(stream)
    }

    fn current_stream(&self) -> Result<Stream, DeviceError> {
        self.inner.current_stream()
    }

    fn set_stream(&mut self, stream: &Stream) -> Result<(), DeviceError> {
        self.inner.set_stream(stream)
    }

    fn tag_stream(&mut self) -> Result<StreamTag, DeviceError> {
        self.inner.tag_stream()
    }

    fn wait_for(&mut self, tag: &StreamTag) -> Result<(), DeviceError> {
        self.inner.wait_for(tag)
    }

    fn time_between(&self, start: &StreamTag, end: &StreamTag) -> Result<Duration, DeviceError> {
        self.inner.time_between(start, end)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.inner.flush()
    }

    fn finish(&mut self) -> Result<(), DeviceError> {
        self.inner.finish()
    }

    fn free(&mut self) {
        self.inner.free()
    }
}
