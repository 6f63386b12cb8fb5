// src/resolver/order.rs

//! Transaction ordering
//!
//! Two depth-first passes over the requirement edges of the packages being
//! ordered. The first follows every edge and yields a stable pre-order; the
//! second re-walks that pre-order following only prerequisite edges, which
//! gives the final sequence. Post-order output puts dependencies first.
//!
//! A back edge reached through a prerequisite edge is a genuine loop only
//! when every stack frame between it and the current package was itself
//! entered through a prerequisite edge. Loops are counted and reported;
//! the packages involved are still emitted exactly once.

use crate::packages::PkgId;
use crate::resolver::graph::PackageSet;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    /// Follow Requires(pre); dependencies come first
    Install,
    /// Follow Requires(preun/postun); dependents come first
    Uninstall,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderResult {
    pub ordered: Vec<PkgId>,
    pub cycle_count: u32,
    /// Members of every detected loop, starting at the package the loop
    /// closes on
    pub cycles: Vec<Vec<PkgId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    All,
    Prereq,
    PrereqUn,
}

struct Visitor<'a> {
    set: &'a PackageSet,
    filter: Filter,
    /// None: not part of the pool being ordered
    colors: Vec<Option<Color>>,
    prereqed: Vec<bool>,
    stack: Vec<PkgId>,
    ordered: Vec<PkgId>,
    cycles: Vec<Vec<PkgId>>,
}

impl<'a> Visitor<'a> {
    fn new(set: &'a PackageSet, pool: &[PkgId], filter: Filter) -> Self {
        let mut colors = vec![None; set.len()];
        for id in pool {
            colors[id.index()] = Some(Color::White);
        }
        Self {
            set,
            filter,
            colors,
            prereqed: vec![false; set.len()],
            stack: Vec::new(),
            ordered: Vec::with_capacity(pool.len()),
            cycles: Vec::new(),
        }
    }

    fn run(mut self, pool: &[PkgId]) -> (Vec<PkgId>, Vec<Vec<PkgId>>) {
        for &id in pool {
            if self.colors[id.index()] == Some(Color::White) {
                self.visit(id);
                for frame in self.stack.drain(..) {
                    self.prereqed[frame.index()] = false;
                }
            }
        }
        (self.ordered, self.cycles)
    }

    fn visit(&mut self, id: PkgId) {
        let set = self.set;
        self.colors[id.index()] = Some(Color::Gray);

        let edges = set.requirements(id);
        let last_stack_i = self.stack.len();
        if !edges.is_empty() {
            self.stack.push(id);
        }

        for edge in edges {
            let flagged = match self.filter {
                Filter::All => false,
                Filter::Prereq => edge.prereq,
                Filter::PrereqUn => edge.prereq_un,
            };

            for &target in edge.target.targets() {
                match self.colors[target.index()] {
                    None => {}
                    Some(Color::White) => {
                        self.prereqed[target.index()] = flagged;
                        if self.filter == Filter::All || flagged {
                            self.visit(target);
                        }
                    }
                    Some(Color::Black) => {}
                    Some(Color::Gray) => {
                        if flagged {
                            self.back_edge(id, target);
                        }
                    }
                }
            }
        }

        self.colors[id.index()] = Some(Color::Black);
        self.prereqed[id.index()] = false;
        self.ordered.push(id);

        if self.stack.len() > last_stack_i {
            for frame in self.stack.drain(last_stack_i..) {
                self.prereqed[frame.index()] = false;
            }
        }
    }

    fn back_edge(&mut self, from: PkgId, target: PkgId) {
        let mut walked = 0;
        let mut nprereqs = 0;
        for frame in self.stack.iter().rev() {
            if *frame == target {
                break;
            }
            walked += 1;
            if !self.prereqed[frame.index()] {
                break;
            }
            nprereqs += 1;
        }

        if walked == 0 || walked != nprereqs {
            debug!(
                "fake cycle {} -> {}",
                self.set.package(from).name,
                self.set.package(target).name
            );
            return;
        }

        let mut members = vec![target];
        members.extend(self.stack.iter().rev().take(walked).copied());

        let mut message = format!("Requires(pre) loop: {}", self.set.package(target).name);
        for frame in self.stack.iter().rev() {
            message.push_str(" <- ");
            message.push_str(&self.set.package(*frame).name);
            if *frame == target {
                break;
            }
        }
        error!("{}", message);
        self.cycles.push(members);
    }
}

/// Order `ids` for a transaction
///
/// Handles outside `ids` are ignored even when edges lead to them.
/// Duplicate handles are ordered once.
pub fn order(set: &PackageSet, ids: &[PkgId], mode: OrderMode) -> OrderResult {
    let mut pool: Vec<PkgId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !pool.contains(id) {
            pool.push(*id);
        }
    }
    pool.sort_by(|a, b| set.package(*a).cmp_pri_name_evr_rev(set.package(*b)));

    let (preordered, _) = Visitor::new(set, &pool, Filter::All).run(&pool);

    let filter = match mode {
        OrderMode::Install => Filter::Prereq,
        OrderMode::Uninstall => Filter::PrereqUn,
    };
    let (mut ordered, cycles) = Visitor::new(set, &preordered, filter).run(&preordered);

    debug_assert_eq!(ordered.len(), pool.len());
    if mode == OrderMode::Uninstall {
        ordered.reverse();
    }

    OrderResult {
        ordered,
        cycle_count: cycles.len() as u32,
        cycles,
    }
}
