//! Hand-rolled recursive-descent reader for the classic `Derive(...)` ATerm
//! text format written by [`super::Derivation::to_aterm_string`].
//!
//! The teacher has no ATerm parser of its own and we'd rather not pull in a
//! combinator crate for one grammar this small; the cursor below just walks
//! the string byte by byte the way the format's own nesting (parens inside
//! brackets inside parens) wants to be walked.

use std::collections::{BTreeMap, BTreeSet};

use crate::derivation::DerivationOutput;
use crate::derived_path::OutputName;
use crate::hash::{self, Hash};
use crate::store_path::{ContentAddress, ContentAddressMethodAlgorithm, StoreDir, StorePath};

use super::error::ReadDerivationError;
use super::Derivation;

const PREFIX: &str = "Derive";

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
    store_dir: &'a StoreDir,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str, store_dir: &'a StoreDir) -> Self {
        Cursor {
            input,
            pos: 0,
            store_dir,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn err(&self, expected: &'static str) -> ReadDerivationError {
        ReadDerivationError::Expected {
            expected,
            offset: self.pos,
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), ReadDerivationError> {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.err_for_char(c))
        }
    }

    fn err_for_char(&self, c: char) -> ReadDerivationError {
        match c {
            '(' => self.err("'('"),
            ')' => self.err("')'"),
            '[' => self.err("'['"),
            ']' => self.err("']'"),
            ',' => self.err("','"),
            '"' => self.err("'\"'"),
            _ => self.err("expected character"),
        }
    }

    fn expect_str(&mut self, s: &str) -> Result<(), ReadDerivationError> {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(self.err("literal"))
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Parses a `"..."` quoted, backslash-escaped string field.
    fn parse_string(&mut self) -> Result<String, ReadDerivationError> {
        self.expect_char('"')?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("closing '\"'")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('n') => {
                            out.push('\n');
                            self.pos += 1;
                        }
                        Some('r') => {
                            out.push('\r');
                            self.pos += 1;
                        }
                        Some('t') => {
                            out.push('\t');
                            self.pos += 1;
                        }
                        Some(c) => {
                            out.push(c);
                            self.pos += c.len_utf8();
                        }
                        None => return Err(self.err("escape sequence")),
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    /// Parses a comma-separated list delimited by `open`/`close`, handing
    /// each element's cursor position to `item`.
    fn parse_list<T>(
        &mut self,
        open: char,
        close: char,
        mut item: impl FnMut(&mut Self) -> Result<T, ReadDerivationError>,
    ) -> Result<Vec<T>, ReadDerivationError> {
        self.expect_char(open)?;
        let mut out = Vec::new();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            out.push(item(self)?);
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.err_for_char(close)),
            }
        }
        Ok(out)
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, ReadDerivationError> {
        self.parse_list('[', ']', |c| c.parse_string())
    }

    fn parse_output(
        &mut self,
        drv_name: &str,
    ) -> Result<(String, DerivationOutput), ReadDerivationError> {
        self.expect_char('(')?;
        let name = self.parse_string()?;
        self.expect_char(',')?;
        let path = self.parse_string()?;
        self.expect_char(',')?;
        let mode_algo = self.parse_string()?;
        self.expect_char(',')?;
        let digest = self.parse_string()?;
        self.expect_char(')')?;

        let output = if mode_algo.is_empty() && digest.is_empty() {
            if path.is_empty() {
                DerivationOutput::Deferred
            } else {
                let store_path = self
                    .store_dir
                    .parse_path(&path)
                    .map_err(|_| self.err("valid store path"))?;
                DerivationOutput::InputAddressed(store_path)
            }
        } else {
            let hash_algo: ContentAddressMethodAlgorithm =
                mode_algo.parse().map_err(|_| self.err("hash algorithm"))?;
            if digest == "impure" {
                #[cfg(feature = "xp-impure-derivations")]
                {
                    return Ok((name, DerivationOutput::Impure(hash_algo)));
                }
                #[cfg(not(feature = "xp-impure-derivations"))]
                {
                    let _ = drv_name;
                    return Err(ReadDerivationError::MissingExperimentalFeature(
                        "impure-derivations",
                    ));
                }
            }
            if path.is_empty() {
                #[cfg(feature = "xp-ca-derivations")]
                {
                    return Ok((name, DerivationOutput::CAFloating(hash_algo)));
                }
                #[cfg(not(feature = "xp-ca-derivations"))]
                {
                    return Err(ReadDerivationError::MissingExperimentalFeature(
                        "ca-derivations",
                    ));
                }
            }
            let hash: Hash = hash::fmt::Any::<Hash>::parse(hash_algo.algorithm(), &digest)?;
            let ca = ContentAddress::from_hash(hash_algo.method(), hash)
                .map_err(|_| self.err("valid content address"))?;
            DerivationOutput::CAFixed(ca)
        };
        Ok((name, output))
    }

    fn parse_input_derivation(
        &mut self,
    ) -> Result<(StorePath, BTreeSet<OutputName>), ReadDerivationError> {
        self.expect_char('(')?;
        let drv_path = self.parse_string()?;
        let drv_path = self
            .store_dir
            .parse_path(&drv_path)
            .map_err(|_| self.err("valid store path"))?;
        self.expect_char(',')?;
        let output_names = self.parse_string_list()?;
        self.expect_char(')')?;
        let mut outputs = BTreeSet::new();
        for name in output_names {
            outputs.insert(name.parse().map_err(|_| self.err("valid output name"))?);
        }
        Ok((drv_path, outputs))
    }

    fn parse_kv_pair(&mut self) -> Result<(String, String), ReadDerivationError> {
        self.expect_char('(')?;
        let key = self.parse_string()?;
        self.expect_char(',')?;
        let value = self.parse_string()?;
        self.expect_char(')')?;
        Ok((key, value))
    }
}

pub(super) fn parse(store_dir: &StoreDir, input: &str) -> Result<Derivation, ReadDerivationError> {
    let mut cursor = Cursor::new(input.trim(), store_dir);
    cursor.expect_str(PREFIX)?;
    cursor.expect_char('(')?;

    // Output names aren't known yet at this point in the text, so the
    // per-output `.drv`-name used to recompute fixed-output paths is
    // threaded through using a placeholder; actual validation of a fixed
    // output's recorded path against its content address happens once the
    // derivation's name (parsed below) is known, via `fill_in_output_paths`.
    let raw_outputs = cursor.parse_list('[', ']', |c| c.parse_output("<pending>"))?;
    cursor.expect_char(',')?;

    let raw_input_drvs = cursor.parse_list('[', ']', |c| c.parse_input_derivation())?;
    cursor.expect_char(',')?;

    let raw_input_srcs = cursor.parse_list('[', ']', |c| c.parse_string())?;
    cursor.expect_char(',')?;

    let platform = cursor.parse_string()?;
    cursor.expect_char(',')?;

    let builder = cursor.parse_string()?;
    cursor.expect_char(',')?;

    let args = cursor.parse_string_list()?;
    cursor.expect_char(',')?;

    let raw_env = cursor.parse_list('[', ']', |c| c.parse_kv_pair())?;
    cursor.expect_char(')')?;

    if !cursor.rest().is_empty() {
        return Err(cursor.err("end of input"));
    }

    let mut outputs = BTreeMap::new();
    for (name, output) in raw_outputs {
        outputs.insert(name, output);
    }

    let mut input_drvs = BTreeMap::new();
    for (path, names) in raw_input_drvs {
        input_drvs.insert(path, names);
    }

    let mut input_srcs = crate::store_path::StorePathSet::new();
    for raw in raw_input_srcs {
        input_srcs.insert(
            store_dir
                .parse_path(&raw)
                .map_err(|_| cursor.err("valid store path"))?,
        );
    }

    let mut env = BTreeMap::new();
    for (k, v) in raw_env {
        env.insert(k, v);
    }

    // The ATerm text never records the derivation's own `name`; `super::
    // Derivation::from_aterm_str` fills it in from the `.drv` file's store
    // path once this parse returns.
    Ok(Derivation {
        name: String::new(),
        platform,
        builder,
        args,
        env,
        input_srcs,
        input_drvs,
        outputs,
        structured_attrs: None,
    })
}
