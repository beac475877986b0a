use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::derived_path::OutputName;
use crate::hash::{self, Hash};
use crate::store_path::{
    ContentAddress, ContentAddressMethodAlgorithm, StoreDir, StorePath, StorePathSet,
};

use super::error::{DerivationOutputsError, ReadDerivationError, WriteDerivationError};
use super::DerivationOutput;

/// A full build recipe: the graph-level counterpart of [`super::BasicDerivation`],
/// carrying the complete `inputDrvs` edge set needed to compute
/// `hashDerivationModulo` and to resolve content-addressed dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub name: String,
    pub platform: String,
    pub builder: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub input_srcs: StorePathSet,
    /// `drvPath -> wanted output names`. Only the root level is populated;
    /// a nested `child_map` entry models a dependency on a *dynamic*
    /// derivation's own output and is left empty here (gated behind
    /// `xp-dynamic-derivations` upstream, out of scope for this store).
    pub input_drvs: BTreeMap<StorePath, BTreeSet<OutputName>>,
    pub outputs: BTreeMap<String, DerivationOutput>,
    pub structured_attrs: Option<serde_json::Value>,
}

/// Whether a [`HashModulo`] could be fully, statically computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// Every input was concrete; the hashes below are final.
    Regular,
    /// At least one input is itself deferred (or depends on a dynamic
    /// derivation's not-yet-known output); the derivation's final hash
    /// can only be known after those inputs are resolved and built.
    Deferred,
}

/// The result of `hashDerivationModulo`: one hash per output name, tagged
/// with whether the computation was able to fully resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct HashModulo {
    pub kind: HashKind,
    pub hashes: BTreeMap<String, Hash>,
}

impl Derivation {
    /// True if this is a single-output, fixed-output derivation (the only
    /// case `hashDerivationModulo` special-cases).
    pub fn is_fixed_output(&self) -> bool {
        matches!(
            self.outputs.iter().collect::<Vec<_>>().as_slice(),
            [(_, DerivationOutput::CAFixed(_))]
        )
    }

    /// The single most important derivation function: computes a hash per
    /// output name that is stable across content-addressed rewriting of
    /// input derivation paths.
    ///
    /// `resolved_inputs` must already contain the `HashModulo` of every
    /// derivation named in `input_drvs` — the caller (the goal scheduler)
    /// is expected to have computed those bottom-up, since doing so here
    /// would require store I/O this module does not have access to.
    pub fn hash_derivation_modulo(
        &self,
        store_dir: &StoreDir,
        resolved_inputs: &BTreeMap<StorePath, HashModulo>,
    ) -> Result<HashModulo, DerivationOutputsError> {
        if self.is_fixed_output() {
            let (output_name, output) = self.outputs.iter().next().expect("checked above");
            let DerivationOutput::CAFixed(ca) = output else {
                unreachable!("is_fixed_output checked the variant");
            };
            let out_path = output
                .path(store_dir, &self.name, output_name)?
                .expect("a fixed-output path is always statically known");
            let input = fixed_output_hash_input(*ca, &store_dir.print_path(&out_path));
            let mut hashes = BTreeMap::new();
            hashes.insert(
                output_name.clone(),
                hash::digest(hash::Algorithm::SHA256, input),
            );
            return Ok(HashModulo {
                kind: HashKind::Regular,
                hashes,
            });
        }

        let mut kind = HashKind::Regular;
        let mut overrides = BTreeMap::new();
        for (drv_path, wanted_outputs) in &self.input_drvs {
            let modulo = resolved_inputs.get(drv_path).ok_or_else(|| {
                DerivationOutputsError::MissingHash(store_dir.print_path(drv_path))
            })?;
            if modulo.kind == HashKind::Deferred {
                kind = HashKind::Deferred;
            }
            for output_name in wanted_outputs {
                let output_hash = modulo.hashes.get(output_name.as_ref()).ok_or_else(|| {
                    DerivationOutputsError::MissingHash(format!(
                        "{}!{}",
                        store_dir.print_path(drv_path),
                        output_name
                    ))
                })?;
                overrides.insert(drv_path.clone(), format!("{:x}", output_hash));
            }
        }

        let canonical = self.to_aterm_string_with_overrides(store_dir, &overrides);
        let digest = hash::digest(hash::Algorithm::SHA256, &canonical);
        let mut hashes = BTreeMap::new();
        for output_name in self.outputs.keys() {
            hashes.insert(
                output_name.clone(),
                hash::digest(
                    hash::Algorithm::SHA256,
                    format!("{}:{:x}", output_name, digest),
                ),
            );
        }
        Ok(HashModulo { kind, hashes })
    }

    /// Replaces every [`DerivationOutput::Deferred`] output with a concrete
    /// [`DerivationOutput::InputAddressed`] computed from `modulo`.
    /// Idempotent; errors if an already-concrete `InputAddressed` output
    /// disagrees with the recomputed path (a tampered derivation).
    pub fn fill_in_output_paths(
        &mut self,
        store_dir: &StoreDir,
        modulo: &HashModulo,
    ) -> Result<(), DerivationOutputsError> {
        for (output_name, output) in self.outputs.iter_mut() {
            let hash = match modulo.hashes.get(output_name) {
                Some(hash) => hash,
                None => continue,
            };
            let path_type = format!("output:{output_name}");
            let computed = store_dir
                .make_store_path(&path_type, *hash, &self.name)
                .map_err(DerivationOutputsError::StorePath)?;
            match output {
                DerivationOutput::Deferred => {
                    *output = DerivationOutput::InputAddressed(computed);
                }
                DerivationOutput::InputAddressed(existing) if *existing != computed => {
                    return Err(DerivationOutputsError::Tampered {
                        name: output_name.clone(),
                        expected: store_dir.print_path(&computed),
                        actual: store_dir.print_path(existing),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `tryResolve`: given a callback that returns the concrete output path
    /// of an `(inputDrv, outputName)` pair (or `None` if it is not yet
    /// known), produce a derivation with every resolvable `inputDrvs` entry
    /// moved into `inputSrcs`. Returns `None` — vetoing resolution — if any
    /// input is not yet known.
    pub fn try_resolve(
        &self,
        mut query_output: impl FnMut(&StorePath, &OutputName) -> Option<StorePath>,
    ) -> Option<Derivation> {
        let mut resolved = self.clone();
        resolved.input_drvs.clear();
        for (drv_path, outputs) in &self.input_drvs {
            for output_name in outputs {
                let resolved_path = query_output(drv_path, output_name)?;
                resolved.input_srcs.insert(resolved_path);
            }
        }
        Some(resolved)
    }

    fn to_aterm_string_with_overrides(
        &self,
        store_dir: &StoreDir,
        drv_path_overrides: &BTreeMap<StorePath, String>,
    ) -> String {
        let mut out = String::from("Derive(");
        write_outputs(&mut out, store_dir, &self.outputs, &self.name);
        out.push(',');
        write_input_drvs(&mut out, store_dir, &self.input_drvs, drv_path_overrides);
        out.push(',');
        write_path_array(&mut out, store_dir, self.input_srcs.iter());
        out.push(',');
        write_quoted(&mut out, &self.platform);
        out.push(',');
        write_quoted(&mut out, &self.builder);
        out.push(',');
        write_string_array(&mut out, self.args.iter());
        out.push(',');
        write_env(&mut out, &self.env);
        out.push(')');
        out
    }

    /// The canonical on-disk ATerm (`.drv` file) text form.
    pub fn to_aterm_string(&self, store_dir: &StoreDir) -> String {
        self.to_aterm_string_with_overrides(store_dir, &BTreeMap::new())
    }

    /// Parses a `.drv` file's ATerm body. `name` is the derivation name as
    /// recovered from the `.drv` file's own store path (the format never
    /// records it in the body itself).
    pub fn from_aterm_str(
        store_dir: &StoreDir,
        name: &str,
        input: &str,
    ) -> Result<Derivation, ReadDerivationError> {
        let mut drv = super::aterm::parse(store_dir, input)?;
        drv.name = name.to_string();
        Ok(drv)
    }

    pub fn to_json_string(&self) -> Result<String, WriteDerivationError> {
        let wire = DerivationJson::from(self.clone());
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn from_json_str(s: &str) -> Result<Derivation, ReadDerivationError> {
        let wire: DerivationJson = serde_json::from_str(s)?;
        wire.try_into()
    }
}

fn fixed_output_hash_input(ca: ContentAddress, out_path_printed: &str) -> String {
    let prefix = match ca {
        ContentAddress::Text(hash) => format!("text:{:x}:", Hash::from(hash)),
        ContentAddress::Flat(hash) => format!("fixed:out:{:x}:", hash),
        ContentAddress::Recursive(hash) => format!("fixed:out:r:{:x}:", hash),
        ContentAddress::Git(hash) => format!("fixed:out:git:{:x}:", hash),
    };
    format!("{prefix}{out_path_printed}")
}

fn escape_aterm(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    out.push_str(&escape_aterm(s));
    out.push('"');
}

fn write_string_array<'a>(out: &mut String, items: impl Iterator<Item = &'a String>) {
    out.push('[');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_quoted(out, item);
    }
    out.push(']');
}

fn write_path_array<'a>(
    out: &mut String,
    store_dir: &StoreDir,
    items: impl Iterator<Item = &'a StorePath>,
) {
    out.push('[');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_quoted(out, &store_dir.print_path(item));
    }
    out.push(']');
}

fn write_env(out: &mut String, env: &BTreeMap<String, String>) {
    out.push('[');
    for (i, (k, v)) in env.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        write_quoted(out, k);
        out.push(',');
        write_quoted(out, v);
        out.push(')');
    }
    out.push(']');
}

fn write_outputs(
    out: &mut String,
    store_dir: &StoreDir,
    outputs: &BTreeMap<String, DerivationOutput>,
    drv_name: &str,
) {
    out.push('[');
    for (i, (output_name, output)) in outputs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        write_quoted(out, output_name);
        out.push(',');
        let (path, mode_algo, digest) = match output {
            DerivationOutput::InputAddressed(path) => {
                (store_dir.print_path(path), String::new(), String::new())
            }
            DerivationOutput::CAFixed(ca) => {
                let path = output
                    .path(store_dir, drv_name, output_name)
                    .ok()
                    .flatten()
                    .map(|p| store_dir.print_path(&p))
                    .unwrap_or_default();
                (path, ca.method_algorithm().to_string(), format!("{:x}", ca.hash()))
            }
            DerivationOutput::Deferred => (String::new(), String::new(), String::new()),
            #[cfg(feature = "xp-ca-derivations")]
            DerivationOutput::CAFloating(algo) => (String::new(), algo.to_string(), String::new()),
            #[cfg(feature = "xp-impure-derivations")]
            DerivationOutput::Impure(algo) => {
                (String::new(), algo.to_string(), "impure".to_string())
            }
        };
        write_quoted(out, &path);
        out.push(',');
        write_quoted(out, &mode_algo);
        out.push(',');
        write_quoted(out, &digest);
        out.push(')');
    }
    out.push(']');
}

fn write_input_drvs(
    out: &mut String,
    store_dir: &StoreDir,
    input_drvs: &BTreeMap<StorePath, BTreeSet<OutputName>>,
    overrides: &BTreeMap<StorePath, String>,
) {
    out.push('[');
    for (i, (drv_path, outputs)) in input_drvs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        match overrides.get(drv_path) {
            Some(hash_hex) => write_quoted(out, hash_hex),
            None => write_quoted(out, &store_dir.print_path(drv_path)),
        }
        out.push(',');
        out.push('[');
        for (j, output_name) in outputs.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            write_quoted(out, output_name.as_ref());
        }
        out.push(']');
        out.push(')');
    }
    out.push(']');
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DerivationJson {
    name: String,
    platform: String,
    builder: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    input_srcs: BTreeSet<StorePath>,
    #[serde(default)]
    input_drvs: BTreeMap<StorePath, BTreeSet<OutputName>>,
    outputs: BTreeMap<String, DerivationOutputJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    structured_attrs: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DerivationOutputJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<StorePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash_algo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

impl From<Derivation> for DerivationJson {
    fn from(drv: Derivation) -> Self {
        let outputs = drv
            .outputs
            .into_iter()
            .map(|(name, output)| (name, DerivationOutputJson::from(output)))
            .collect();
        DerivationJson {
            name: drv.name,
            platform: drv.platform,
            builder: drv.builder,
            args: drv.args,
            env: drv.env,
            input_srcs: drv.input_srcs,
            input_drvs: drv.input_drvs,
            outputs,
            structured_attrs: drv.structured_attrs,
        }
    }
}

impl From<DerivationOutput> for DerivationOutputJson {
    fn from(output: DerivationOutput) -> Self {
        match output {
            DerivationOutput::InputAddressed(path) => DerivationOutputJson {
                path: Some(path),
                hash_algo: None,
                hash: None,
            },
            DerivationOutput::CAFixed(ca) => DerivationOutputJson {
                path: None,
                hash_algo: Some(ca.method_algorithm().to_string()),
                hash: Some(format!("{:x}", ca.hash())),
            },
            DerivationOutput::Deferred => DerivationOutputJson {
                path: None,
                hash_algo: None,
                hash: None,
            },
            #[cfg(feature = "xp-ca-derivations")]
            DerivationOutput::CAFloating(algo) => DerivationOutputJson {
                path: None,
                hash_algo: Some(algo.to_string()),
                hash: None,
            },
            #[cfg(feature = "xp-impure-derivations")]
            DerivationOutput::Impure(algo) => DerivationOutputJson {
                path: None,
                hash_algo: Some(algo.to_string()),
                hash: Some("impure".to_string()),
            },
        }
    }
}

impl TryFrom<DerivationJson> for Derivation {
    type Error = ReadDerivationError;

    fn try_from(wire: DerivationJson) -> Result<Self, Self::Error> {
        let mut outputs = BTreeMap::new();
        for (name, output) in wire.outputs {
            outputs.insert(name, output.try_into()?);
        }
        Ok(Derivation {
            name: wire.name,
            platform: wire.platform,
            builder: wire.builder,
            args: wire.args,
            env: wire.env,
            input_srcs: wire.input_srcs,
            input_drvs: wire.input_drvs,
            outputs,
            structured_attrs: wire.structured_attrs,
        })
    }
}

impl TryFrom<DerivationOutputJson> for DerivationOutput {
    type Error = ReadDerivationError;

    fn try_from(wire: DerivationOutputJson) -> Result<Self, Self::Error> {
        match (wire.path, wire.hash_algo, wire.hash) {
            (Some(path), None, None) => Ok(DerivationOutput::InputAddressed(path)),
            (None, None, None) => Ok(DerivationOutput::Deferred),
            (path, Some(hash_algo), hash) => {
                let hash_algo: ContentAddressMethodAlgorithm =
                    hash_algo.parse().map_err(|_| ReadDerivationError::Expected {
                        expected: "content address method/algorithm",
                        offset: 0,
                    })?;
                let hash = hash.ok_or_else(|| {
                    ReadDerivationError::Expected {
                        expected: "hash",
                        offset: 0,
                    }
                })?;
                if hash == "impure" {
                    #[cfg(feature = "xp-impure-derivations")]
                    {
                        return Ok(DerivationOutput::Impure(hash_algo));
                    }
                    #[cfg(not(feature = "xp-impure-derivations"))]
                    {
                        return Err(ReadDerivationError::MissingExperimentalFeature(
                            "impure-derivations",
                        ));
                    }
                }
                if path.is_none() {
                    #[cfg(feature = "xp-ca-derivations")]
                    {
                        return Ok(DerivationOutput::CAFloating(hash_algo));
                    }
                    #[cfg(not(feature = "xp-ca-derivations"))]
                    {
                        return Err(ReadDerivationError::MissingExperimentalFeature(
                            "ca-derivations",
                        ));
                    }
                }
                let h = hash::fmt::Any::<Hash>::parse(hash_algo.algorithm(), &hash)?;
                let ca = ContentAddress::from_hash(hash_algo.method(), h)
                    .map_err(|_| ReadDerivationError::Expected {
                        expected: "valid content address",
                        offset: 0,
                    })?;
                Ok(DerivationOutput::CAFixed(ca))
            }
            _ => Err(ReadDerivationError::Expected {
                expected: "consistent output fields",
                offset: 0,
            }),
        }
    }
}
