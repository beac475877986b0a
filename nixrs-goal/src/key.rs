//! Deterministic, prefixed cache keys for goal interning.
//!
//! Keys are prefixed so that goals of different kinds sort into a fixed
//! relative order (substitution before building, administration before
//! either), and within a prefix by derivation name so "aardvark" builds
//! before "baboon".

use nixrs::derived_path::{DerivedPath, OutputName, OutputSpec, SingleDerivedPath};
use nixrs::realisation::DrvOutput;
use nixrs::store_path::{StoreDir, StoreDirDisplay, StorePath};

fn path_part_of_req(req: &SingleDerivedPath) -> &StorePath {
    match req {
        SingleDerivedPath::Opaque(path) => path,
        SingleDerivedPath::Built { drv_path, .. } => path_part_of_req(drv_path),
    }
}

pub fn derivation_trampoline(
    store_dir: &StoreDir,
    drv_req: &SingleDerivedPath,
    wanted_outputs: &OutputSpec,
) -> String {
    let name = path_part_of_req(drv_req).name();
    let built = DerivedPath::Built {
        drv_path: drv_req.clone(),
        outputs: wanted_outputs.clone(),
    };
    format!("da${}${}", name, store_dir.display(&built))
}

pub fn derivation(store_dir: &StoreDir, drv_path: &StorePath, wanted_output: &OutputName) -> String {
    let built = SingleDerivedPath::Built {
        drv_path: Box::new(SingleDerivedPath::Opaque(drv_path.clone())),
        output: wanted_output.clone(),
    };
    format!("db${}${}", drv_path.name(), store_dir.display(&built))
}

pub fn derivation_resolution(store_dir: &StoreDir, drv_path: &StorePath) -> String {
    format!("dr${}${}", drv_path.name(), store_dir.display(drv_path))
}

pub fn build_trace_trampoline(store_dir: &StoreDir, id: &SingleDerivedPath) -> String {
    let name = path_part_of_req(id).name();
    format!("bt${}${}", name, store_dir.display(id))
}

/// Variant of [`build_trace_trampoline`] for goals working from a bare
/// [`DrvOutput`] id rather than a [`SingleDerivedPath`] request (there is no
/// derivation name to sort by without resolving the drv hash back to a
/// path, so this sorts after every named `bt$` entry).
pub fn build_trace_trampoline_for_output(id: &DrvOutput) -> String {
    format!("bt$${id}")
}

pub fn path_substitution(store_dir: &StoreDir, path: &StorePath) -> String {
    format!("pb${}${}", path.name(), store_dir.display(path))
}

pub fn drv_output_substitution(id: &DrvOutput) -> String {
    format!("do${id}")
}

/// One build call produces every output `drv` declares, so the goal key
/// is per-`drv_path` only — keying on `wanted_output` too would let two
/// outputs of the same derivation race each other into separate
/// `build_derivation` calls instead of sharing the one build.
pub fn derivation_building(store_dir: &StoreDir, drv_path: &StorePath) -> String {
    format!("bd${}${}", drv_path.name(), store_dir.display(drv_path))
}
