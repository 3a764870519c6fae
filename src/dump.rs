//! Serialization of single functions to a compact binary stream.
//!
//! The stream encodes the function over a caller-supplied variable list
//! covering its support, using positions into that list instead of manager
//! ids. Reloading against a different list of the same length substitutes
//! the new list's i-th variable for the old one, so dump and undump double
//! as a cross-manager transfer with renaming.
//!
//! Node indexes and shared-node numbers are written in the smallest byte
//! width their range allows. Special records (constants, variables, shared
//! references and labels) are escaped with an all-ones index followed by a
//! one-byte tag. Nodes with several parents are written once, labeled in
//! preorder, and referenced by number afterwards.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use log::warn;

use crate::edge::{Edge, NodeId};
use crate::manager::{Bdd, Func};
use crate::types::{BddError, Var};

const MAGIC_COOKIE: u32 = 0x5e02_f795;

const TRUE_ENCODING: u8 = 0x00;
const FALSE_ENCODING: u8 = 0x01;
const POSVAR_ENCODING: u8 = 0x02;
const NEGVAR_ENCODING: u8 = 0x03;
const POSNODE_ENCODING: u8 = 0x04;
const NEGNODE_ENCODING: u8 = 0x05;
const NODELABEL_ENCODING: u8 = 0x06;

/// Smallest number of bytes whose range covers `0..n`.
fn bytes_needed(n: usize) -> usize {
    if n <= 0x100 {
        1
    } else if n <= 0x10000 {
        2
    } else if n <= 0x100_0000 {
        3
    } else {
        4
    }
}

fn write_be(w: &mut impl Write, value: u64, bytes: usize) -> Result<(), BddError> {
    for shift in (0..bytes).rev() {
        w.write_all(&[(value >> (8 * shift)) as u8])?;
    }
    Ok(())
}

fn read_be(r: &mut impl Read, bytes: usize) -> Result<u64, BddError> {
    let mut value = 0u64;
    let mut buf = [0u8; 1];
    for _ in 0..bytes {
        match r.read_exact(&mut buf) {
            Ok(()) => value = (value << 8) | buf[0] as u64,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(BddError::BadFormat)
            }
            Err(e) => return Err(BddError::Io(e)),
        }
    }
    Ok(value)
}

struct Dumper<'a, W> {
    w: &'a mut W,
    /// Normalized index per variable id; `u32::MAX` for ids off the list.
    normalized: Vec<u32>,
    shared: HashSet<NodeId>,
    /// Preorder number and label-time polarity per labeled shared node.
    labels: HashMap<NodeId, (u64, bool)>,
    next_label: u64,
    index_size: usize,
    node_number_size: usize,
}

impl<W: Write> Dumper<'_, W> {
    fn escape(&mut self, tag: u8) -> Result<(), BddError> {
        write_be(self.w, u64::MAX, self.index_size)?;
        write_be(self.w, tag as u64, 1)
    }

    fn step(&mut self, bdd: &Bdd, f: Edge) -> Result<(), BddError> {
        if f.is_one() {
            return self.escape(TRUE_ENCODING);
        }
        if f.is_zero() {
            return self.escape(FALSE_ENCODING);
        }
        let index = self.normalized[f.id() as usize] as u64;
        let live = bdd.live(f.node);
        if live.then.is_one() && live.els.is_zero() {
            let tag = if f.is_complement() {
                NEGVAR_ENCODING
            } else {
                POSVAR_ENCODING
            };
            self.escape(tag)?;
            return write_be(self.w, index, self.index_size);
        }
        if let Some(&(number, polarity)) = self.labels.get(&f.node) {
            let tag = if f.is_complement() == polarity {
                POSNODE_ENCODING
            } else {
                NEGNODE_ENCODING
            };
            self.escape(tag)?;
            return write_be(self.w, number, self.node_number_size);
        }
        if self.shared.contains(&f.node) {
            self.escape(NODELABEL_ENCODING)?;
            self.labels
                .insert(f.node, (self.next_label, f.is_complement()));
            self.next_label += 1;
        }
        write_be(self.w, index, self.index_size)?;
        let (then, els) = (bdd.then_edge(f), bdd.else_edge(f));
        self.step(bdd, then)?;
        self.step(bdd, els)
    }
}

impl Bdd {
    /// Nodes of `f` with more than one parent, projection nodes excluded
    /// (those are always written as variable records).
    fn shared_nodes(&self, f: Edge) -> HashSet<NodeId> {
        let mut visits: HashMap<NodeId, u32> = HashMap::new();
        let mut stack = vec![f.node];
        while let Some(node) = stack.pop() {
            if node.is_terminal() {
                continue;
            }
            let live = self.live(node);
            if live.then.is_one() && live.els.is_zero() {
                continue;
            }
            let count = visits.entry(node).or_insert(0);
            *count += 1;
            if *count == 1 {
                stack.push(live.then.node);
                stack.push(live.els.node);
            }
        }
        visits
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(node, _)| node)
            .collect()
    }

    /// Writes `f` to `w`. The list `vars` must cover the support of `f`
    /// without duplicates; its order defines the indexes in the stream.
    pub fn dump<W: Write>(&self, f: Func, vars: &[Var], w: &mut W) -> Result<(), BddError> {
        let f = self.edge(f);
        let mut normalized = vec![u32::MAX; self.subtables.len()];
        for (position, &var) in vars.iter().enumerate() {
            if normalized[var.id() as usize] != u32::MAX {
                warn!("dump: {} duplicated in the variable list", var);
                return Err(BddError::UnknownVariable);
            }
            normalized[var.id() as usize] = position as u32;
        }
        for node in self.reachable_internal(f) {
            if normalized[node.id as usize] == u32::MAX {
                warn!("dump: support of the function exceeds the variable list");
                return Err(BddError::UnknownVariable);
            }
        }

        let shared = self.shared_nodes(f);
        let index_size = bytes_needed(vars.len() + 1);
        let node_number_size = bytes_needed(shared.len());

        write_be(w, MAGIC_COOKIE as u64, 4)?;
        write_be(w, vars.len() as u64, 2)?;
        write_be(w, shared.len() as u64, 4)?;
        let mut dumper = Dumper {
            w,
            normalized,
            shared,
            labels: HashMap::new(),
            next_label: 0,
            index_size,
            node_number_size,
        };
        dumper.step(self, f)
    }

    fn reachable_internal(&self, f: Edge) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![f.node];
        while let Some(node) = stack.pop() {
            if node.is_terminal() || !visited.insert(node) {
                continue;
            }
            out.push(node);
            let live = self.live(node);
            stack.push(live.then.node);
            stack.push(live.els.node);
        }
        out
    }

    /// Reads a function written by [`Bdd::dump`]. The stream's i-th variable
    /// becomes `vars[i]`, so reloading with the dumping list reproduces the
    /// original function exactly.
    pub fn undump<R: Read>(&mut self, vars: &[Var], r: &mut R) -> Result<Func, BddError> {
        if read_be(r, 4)? as u32 != MAGIC_COOKIE {
            return Err(BddError::BadMagic);
        }
        let number_vars = read_be(r, 2)? as usize;
        if number_vars != vars.len() {
            warn!(
                "undump: stream has {} variables, caller supplied {}",
                number_vars,
                vars.len()
            );
            return Err(BddError::BadFormat);
        }
        let number_shared = read_be(r, 4)? as usize;
        let index_size = bytes_needed(number_vars + 1);
        let node_number_size = bytes_needed(number_shared);

        let mut shared: Vec<Option<Edge>> = vec![None; number_shared];
        let mut shared_so_far = 0;
        let result = self.undump_step(
            vars,
            r,
            &mut shared,
            &mut shared_so_far,
            index_size,
            node_number_size,
        )?;
        if shared_so_far != number_shared {
            return Err(BddError::BadFormat);
        }
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    fn undump_step<R: Read>(
        &mut self,
        vars: &[Var],
        r: &mut R,
        shared: &mut Vec<Option<Edge>>,
        shared_so_far: &mut usize,
        index_size: usize,
        node_number_size: usize,
    ) -> Result<Edge, BddError> {
        let mask = (1u64 << (8 * index_size)) - 1;
        let index = read_be(r, index_size)?;
        if index == mask {
            return match read_be(r, 1)? as u8 {
                TRUE_ENCODING => Ok(Edge::ONE),
                FALSE_ENCODING => Ok(Edge::ZERO),
                tag @ (POSVAR_ENCODING | NEGVAR_ENCODING) => {
                    let i = read_be(r, index_size)? as usize;
                    if i >= vars.len() {
                        return Err(BddError::BadFormat);
                    }
                    let edge = self.var_edges[vars[i].id() as usize];
                    Ok(edge.negate_if(tag == NEGVAR_ENCODING))
                }
                tag @ (POSNODE_ENCODING | NEGNODE_ENCODING) => {
                    let number = read_be(r, node_number_size)? as usize;
                    match shared.get(number).copied().flatten() {
                        Some(edge) => Ok(edge.negate_if(tag == NEGNODE_ENCODING)),
                        None => Err(BddError::BadFormat),
                    }
                }
                NODELABEL_ENCODING => {
                    // Labels are assigned in stream order; the body follows.
                    let number = *shared_so_far;
                    *shared_so_far += 1;
                    if number >= shared.len() {
                        return Err(BddError::BadFormat);
                    }
                    let edge = self.undump_step(
                        vars,
                        r,
                        shared,
                        shared_so_far,
                        index_size,
                        node_number_size,
                    )?;
                    shared[number] = Some(edge);
                    Ok(edge)
                }
                _ => Err(BddError::BadFormat),
            };
        }
        if index as usize >= vars.len() {
            return Err(BddError::BadFormat);
        }
        let then = self.undump_step(vars, r, shared, shared_so_far, index_size, node_number_size)?;
        let els = self.undump_step(vars, r, shared, shared_so_far, index_size, node_number_size)?;
        let projection = self.var_edges[vars[index as usize].id() as usize];
        Ok(self.apply_ite(projection, then, els))
    }
}
