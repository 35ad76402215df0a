//! Shared test utilities
//!
//! `MockModule` is a scripted in-memory stand-in for a compiled model
//! library. It simulates a 32-bit heap, tracks which blocks belong to the
//! client and which to the library, logs every call, and can be told to
//! fail at any entry point. Misuse (double free, freeing library memory,
//! out-of-bounds access, using a destroyed handle) panics.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::os::raw::c_int;
use tinystan::ffi::{
    CStrPtr, ErrorPtr, ModelPtr, OptimizeArgs, PathfinderArgs, Ptr, SampleArgs, StanModule,
};
use tinystan::StanModel;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

pub const PTR_SIZE: usize = 4;

/// Fill byte for fresh allocations, so unread cells are never zero
const GARBAGE: u8 = 0xAB;

/// Entry points that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    CreateModel,
    Sample,
    Pathfinder,
    Optimize,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub param_names: String,
    pub free_params: usize,
    pub separator: u8,
    pub fail_at: Option<Entry>,
    pub fail_code: c_int,
    pub error_message: String,
    pub error_type: c_int,
    /// Fail without writing an error object
    pub omit_error_object: bool,
    /// Zero-based index of the `malloc` call that returns NULL
    pub fail_malloc_at: Option<usize>,
    pub api_version: (i32, i32, i32),
    pub stan_version: (i32, i32, i32),
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            param_names: "mu,sigma".to_string(),
            free_params: 2,
            separator: 0x1C,
            fail_at: None,
            fail_code: 1,
            error_message: "something went wrong".to_string(),
            error_type: 0,
            omit_error_object: false,
            fail_malloc_at: None,
            api_version: tinystan::API_VERSION,
            stan_version: (2, 36, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Client,
    Module,
}

struct Block {
    bytes: Vec<u8>,
    owner: Owner,
}

#[derive(Default)]
struct State {
    blocks: BTreeMap<usize, Block>,
    next_addr: usize,
    malloc_attempts: usize,
    mallocs: usize,
    frees: usize,
    calls: Vec<&'static str>,
    // model -> its parameter-name string
    models: HashMap<usize, usize>,
    // error object -> (message string, type)
    errors: HashMap<usize, (usize, c_int)>,
    last_data: Option<String>,
    last_seed: Option<u32>,
    last_inits: Option<String>,
    last_init_metric: Option<Vec<f64>>,
    last_sample: Option<SampleArgs>,
    last_pathfinder: Option<PathfinderArgs>,
    last_optimize: Option<OptimizeArgs>,
}

impl State {
    fn place(&mut self, bytes: Vec<u8>, owner: Owner) -> usize {
        if self.next_addr == 0 {
            self.next_addr = 16;
        }
        let addr = self.next_addr;
        let len = bytes.len().max(1);
        // Leave a gap so overruns land outside every block.
        self.next_addr += (len + 7) / 8 * 8 + 8;
        self.blocks.insert(addr, Block { bytes, owner });
        addr
    }

    fn locate(&self, addr: usize, len: usize) -> (usize, usize) {
        let (base, block) = self
            .blocks
            .range(..=addr)
            .next_back()
            .unwrap_or_else(|| panic!("access to unallocated address {:#x}", addr));
        let offset = addr - base;
        if offset + len > block.bytes.len() {
            panic!(
                "out-of-bounds access at {:#x}+{} (block {:#x} of {} bytes)",
                addr,
                len,
                base,
                block.bytes.len()
            );
        }
        (*base, offset)
    }

    fn write(&mut self, addr: usize, bytes: &[u8]) {
        let (base, offset) = self.locate(addr, bytes.len());
        let block = self.blocks.get_mut(&base).unwrap();
        block.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        let (base, offset) = self.locate(addr, len);
        self.blocks[&base].bytes[offset..offset + len].to_vec()
    }

    fn read_cstr(&self, addr: usize) -> String {
        let (base, offset) = self.locate(addr, 0);
        let bytes = &self.blocks[&base].bytes[offset..];
        let end = bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or_else(|| panic!("unterminated string at {:#x}", addr));
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    fn release(&mut self, addr: usize, owner: Owner) {
        match self.blocks.remove(&addr) {
            None => panic!("double free or invalid free of {:#x}", addr),
            Some(block) if block.owner != owner => {
                panic!("freeing {:?}-owned block {:#x} as {:?}", block.owner, addr, owner)
            }
            Some(_) => {}
        }
    }

    fn place_str(&mut self, s: &str, owner: Owner) -> usize {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.place(bytes, owner)
    }

    fn read_f64s(&self, addr: usize, len: usize) -> Vec<f64> {
        self.read(addr, len * 8)
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn fill_f64s(&mut self, addr: usize, len: usize) {
        let bytes: Vec<u8> = (0..len).flat_map(|k| (k as f64).to_ne_bytes()).collect();
        self.write(addr, &bytes);
    }

    fn assert_model(&self, model: ModelPtr) {
        assert!(
            self.models.contains_key(&model.addr()),
            "use of dead model handle {:?}",
            model
        );
    }

    fn assert_error(&self, err: ErrorPtr) {
        assert!(
            self.errors.contains_key(&err.addr()),
            "use of dead error handle {:?}",
            err
        );
    }
}

/// In-memory model library
pub struct MockModule {
    pub config: MockConfig,
    state: RefCell<State>,
}

impl MockModule {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            state: RefCell::new(State::default()),
        }
    }

    pub fn failing_at(entry: Entry) -> Self {
        Self::new(MockConfig {
            fail_at: Some(entry),
            ..Default::default()
        })
    }

    pub fn mallocs(&self) -> usize {
        self.state.borrow().mallocs
    }

    pub fn frees(&self) -> usize {
        self.state.borrow().frees
    }

    pub fn live_client_blocks(&self) -> usize {
        self.state
            .borrow()
            .blocks
            .values()
            .filter(|b| b.owner == Owner::Client)
            .count()
    }

    pub fn live_models(&self) -> usize {
        self.state.borrow().models.len()
    }

    pub fn live_errors(&self) -> usize {
        self.state.borrow().errors.len()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.state.borrow().calls.iter().filter(|c| **c == name).count()
    }

    /// Log entries other than the memory primitives
    pub fn entry_calls(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(*c, "malloc" | "free"))
            .collect()
    }

    pub fn last_data(&self) -> Option<String> {
        self.state.borrow().last_data.clone()
    }

    pub fn last_seed(&self) -> Option<u32> {
        self.state.borrow().last_seed
    }

    pub fn last_inits(&self) -> Option<String> {
        self.state.borrow().last_inits.clone()
    }

    pub fn last_init_metric(&self) -> Option<Vec<f64>> {
        self.state.borrow().last_init_metric.clone()
    }

    pub fn last_sample(&self) -> Option<SampleArgs> {
        self.state.borrow().last_sample.clone()
    }

    pub fn last_pathfinder(&self) -> Option<PathfinderArgs> {
        self.state.borrow().last_pathfinder.clone()
    }

    pub fn last_optimize(&self) -> Option<OptimizeArgs> {
        self.state.borrow().last_optimize.clone()
    }

    /// Every client allocation freed, every handle released
    pub fn assert_balanced(&self) {
        assert_eq!(self.mallocs(), self.frees(), "malloc/free imbalance");
        assert_eq!(self.live_client_blocks(), 0, "leaked client buffers");
        assert_eq!(self.live_models(), 0, "leaked model");
        assert_eq!(self.live_errors(), 0, "leaked error object");
    }

    fn fails(&self, entry: Entry) -> bool {
        self.config.fail_at == Some(entry)
    }

    fn write_error(&self, st: &mut State, cell: Ptr) {
        if self.config.omit_error_object {
            return;
        }
        let message = st.place_str(&self.config.error_message, Owner::Module);
        let err = st.place(vec![0; 8], Owner::Module);
        st.errors.insert(err, (message, self.config.error_type));
        st.write(cell.addr(), &(err as u32).to_le_bytes());
    }

    fn record_inits(st: &mut State, inits: CStrPtr) {
        let inits = (!inits.is_null()).then(|| st.read_cstr(inits.addr()));
        st.last_inits = inits;
    }

    fn write_version(st: &mut State, cells: [Ptr; 3], version: (i32, i32, i32)) {
        st.write(cells[0].addr(), &version.0.to_le_bytes());
        st.write(cells[1].addr(), &version.1.to_le_bytes());
        st.write(cells[2].addr(), &version.2.to_le_bytes());
    }
}

impl Default for MockModule {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl StanModule for MockModule {
    fn ptr_size(&self) -> usize {
        PTR_SIZE
    }

    fn malloc(&self, n_bytes: usize) -> Ptr {
        let mut st = self.state.borrow_mut();
        st.calls.push("malloc");
        let attempt = st.malloc_attempts;
        st.malloc_attempts += 1;
        if self.config.fail_malloc_at == Some(attempt) {
            return Ptr::NULL;
        }
        st.mallocs += 1;
        Ptr::from_addr(st.place(vec![GARBAGE; n_bytes], Owner::Client))
    }

    unsafe fn free(&self, ptr: Ptr) {
        let mut st = self.state.borrow_mut();
        st.calls.push("free");
        if ptr.is_null() {
            return;
        }
        st.release(ptr.addr(), Owner::Client);
        st.frees += 1;
    }

    unsafe fn write_bytes(&self, ptr: Ptr, bytes: &[u8]) {
        self.state.borrow_mut().write(ptr.addr(), bytes);
    }

    unsafe fn read_bytes(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        self.state.borrow().read(ptr.addr(), len)
    }

    unsafe fn read_addr(&self, cell: Ptr) -> usize {
        let mut st = self.state.borrow_mut();
        st.calls.push("read_addr");
        let bytes = st.read(cell.addr(), PTR_SIZE);
        u32::from_le_bytes(bytes.try_into().unwrap()) as usize
    }

    unsafe fn read_i32(&self, ptr: Ptr) -> i32 {
        let bytes = self.state.borrow().read(ptr.addr(), 4);
        i32::from_le_bytes(bytes.try_into().unwrap())
    }

    unsafe fn read_f64s(&self, ptr: Ptr, len: usize) -> Vec<f64> {
        self.state.borrow().read_f64s(ptr.addr(), len)
    }

    unsafe fn read_c_string(&self, s: CStrPtr) -> String {
        self.state.borrow().read_cstr(s.addr())
    }

    unsafe fn create_model(&self, data: CStrPtr, seed: u32, err: Ptr) -> ModelPtr {
        let mut st = self.state.borrow_mut();
        st.calls.push("create_model");
        let data = st.read_cstr(data.addr());
        st.last_data = Some(data);
        st.last_seed = Some(seed);

        if self.fails(Entry::CreateModel) {
            self.write_error(&mut st, err);
            return ModelPtr::NULL;
        }
        let names = st.place_str(&self.config.param_names, Owner::Module);
        let model = st.place(vec![0; 16], Owner::Module);
        st.models.insert(model, names);
        ModelPtr::from_addr(model)
    }

    unsafe fn destroy_model(&self, model: ModelPtr) {
        let mut st = self.state.borrow_mut();
        st.calls.push("destroy_model");
        let names = st
            .models
            .remove(&model.addr())
            .unwrap_or_else(|| panic!("destroying dead model {:?}", model));
        st.release(names, Owner::Module);
        st.release(model.addr(), Owner::Module);
    }

    unsafe fn model_param_names(&self, model: ModelPtr) -> CStrPtr {
        let st = self.state.borrow();
        st.assert_model(model);
        CStrPtr::from_addr(st.models[&model.addr()])
    }

    unsafe fn model_num_free_params(&self, model: ModelPtr) -> usize {
        self.state.borrow().assert_model(model);
        self.config.free_params
    }

    fn separator_char(&self) -> u8 {
        self.config.separator
    }

    unsafe fn sample(&self, args: &SampleArgs) -> c_int {
        let mut st = self.state.borrow_mut();
        st.calls.push("sample");
        st.assert_model(args.model);
        st.last_sample = Some(args.clone());
        Self::record_inits(&mut st, args.inits);
        let slots = args.num_chains
            * args
                .metric
                .slots_per_chain(self.config.free_params)
                .unwrap();
        let init_metric = (!args.init_inv_metric.is_null())
            .then(|| st.read_f64s(args.init_inv_metric.addr(), slots));
        st.last_init_metric = init_metric;

        if self.fails(Entry::Sample) {
            self.write_error(&mut st, args.err);
            return self.config.fail_code;
        }
        st.fill_f64s(args.out.addr(), args.out_size);
        if !args.metric_out.is_null() {
            st.fill_f64s(args.metric_out.addr(), slots);
        }
        0
    }

    unsafe fn pathfinder(&self, args: &PathfinderArgs) -> c_int {
        let mut st = self.state.borrow_mut();
        st.calls.push("pathfinder");
        st.assert_model(args.model);
        st.last_pathfinder = Some(args.clone());
        Self::record_inits(&mut st, args.inits);

        if self.fails(Entry::Pathfinder) {
            self.write_error(&mut st, args.err);
            return self.config.fail_code;
        }
        st.fill_f64s(args.out.addr(), args.out_size);
        0
    }

    unsafe fn optimize(&self, args: &OptimizeArgs) -> c_int {
        let mut st = self.state.borrow_mut();
        st.calls.push("optimize");
        st.assert_model(args.model);
        st.last_optimize = Some(args.clone());
        Self::record_inits(&mut st, args.init);

        if self.fails(Entry::Optimize) {
            self.write_error(&mut st, args.err);
            return self.config.fail_code;
        }
        st.fill_f64s(args.out.addr(), args.out_size);
        0
    }

    unsafe fn get_error_message(&self, err: ErrorPtr) -> CStrPtr {
        let mut st = self.state.borrow_mut();
        st.calls.push("get_error_message");
        st.assert_error(err);
        CStrPtr::from_addr(st.errors[&err.addr()].0)
    }

    unsafe fn get_error_type(&self, err: ErrorPtr) -> c_int {
        let mut st = self.state.borrow_mut();
        st.calls.push("get_error_type");
        st.assert_error(err);
        st.errors[&err.addr()].1
    }

    unsafe fn destroy_error(&self, err: ErrorPtr) {
        let mut st = self.state.borrow_mut();
        st.calls.push("destroy_error");
        let (message, _) = st
            .errors
            .remove(&err.addr())
            .unwrap_or_else(|| panic!("destroying dead error {:?}", err));
        st.release(message, Owner::Module);
        st.release(err.addr(), Owner::Module);
    }

    unsafe fn api_version(&self, major: Ptr, minor: Ptr, patch: Ptr) {
        let mut st = self.state.borrow_mut();
        st.calls.push("api_version");
        Self::write_version(&mut st, [major, minor, patch], self.config.api_version);
    }

    unsafe fn stan_version(&self, major: Ptr, minor: Ptr, patch: Ptr) {
        let mut st = self.state.borrow_mut();
        st.calls.push("stan_version");
        Self::write_version(&mut st, [major, minor, patch], self.config.stan_version);
    }
}

/// Model over a default mock library
pub fn mock_model() -> StanModel<MockModule> {
    StanModel::new(MockModule::default())
}

pub fn mock_model_with(config: MockConfig) -> StanModel<MockModule> {
    StanModel::new(MockModule::new(config))
}
