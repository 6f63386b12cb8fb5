// src/resolver/select.rs

//! Choosing among alternative providers
//!
//! Candidates are scored and the best score wins; ties go to the first
//! candidate in name order, newest version first.

use crate::config::ResolveConfig;
use crate::error::Result;
use crate::packages::{Capreq, PkgId};
use crate::resolver::graph::PackageSet;
use crate::resolver::installed::InstalledSet;
use crate::resolver::mark::{MarkPolicy, MarkSet};
use std::collections::HashSet;
use tracing::debug;

const SCORE_UPGRADE: i32 = 5;
const SCORE_COLOR: i32 = 2;
const SCORE_ARCH: i32 = 1;
const SCORE_CONFLICT: i32 = -5;
const SCORE_OTHER_VERSION_MARKED: i32 = -10;
const SCORE_BAD_REQS: i32 = -10;
const SCORE_REJECTED: i32 = -999;

/// Pick the best of `candidates` for a requirement of `requirer`
pub fn select_best(
    set: &PackageSet,
    marks: &MarkSet,
    installed: &mut InstalledSet<'_>,
    rejected: &HashSet<PkgId>,
    requirer: Option<PkgId>,
    candidates: &[PkgId],
) -> Result<Option<PkgId>> {
    if candidates.len() <= 1 {
        return Ok(candidates.first().copied());
    }

    let mut sorted = candidates.to_vec();
    set.sort_ids(&mut sorted);

    let mut best: Option<(i32, PkgId)> = None;
    for id in sorted {
        let score = score(set, marks, installed, rejected, requirer, id)?;
        debug!("candidate {} scores {}", set.package(id), score);
        if best.is_none_or(|(s, _)| score > s) {
            best = Some((score, id));
        }
    }

    Ok(best.map(|(_, id)| id))
}

fn score(
    set: &PackageSet,
    marks: &MarkSet,
    installed: &mut InstalledSet<'_>,
    rejected: &HashSet<PkgId>,
    requirer: Option<PkgId>,
    id: PkgId,
) -> Result<i32> {
    let pkg = set.package(id);
    let mut score = 0;

    for recno in installed.installed_versions(&pkg.name)? {
        if installed.get(recno).is_some_and(|inst| inst.evr < pkg.evr) {
            score += SCORE_UPGRADE;
            break;
        }
    }

    if let Some(requirer) = requirer.map(|r| set.package(r)) {
        if requirer.color != 0 && pkg.color != 0 && requirer.color & pkg.color != 0 {
            score += SCORE_COLOR;
        }
        if pkg.arch.is_some() && pkg.arch == requirer.arch {
            score += SCORE_ARCH;
        }
    }

    for edge in set.conflicts(id) {
        if marks.is_marked(edge.pkg) {
            score += SCORE_CONFLICT;
        }
    }
    for other in set.conflicted_by(id) {
        if marks.is_marked(*other) {
            score += SCORE_CONFLICT;
        }
    }

    let other_marked = set
        .providers(&pkg.name)
        .into_iter()
        .any(|o| o != id && set.package(o).name == pkg.name && marks.is_marked(o));
    if other_marked {
        score += SCORE_OTHER_VERSION_MARKED;
    }

    if set.has_bad_reqs(id) {
        score += SCORE_BAD_REQS;
    }
    if rejected.contains(&id) {
        score += SCORE_REJECTED;
    }

    Ok(score)
}

/// Marking policy used while resolving an installation: requirements
/// already met by installed packages that stay are not followed, and
/// alternatives are chosen by score
pub struct InstallPolicy<'r, 's> {
    pub installed: &'r mut InstalledSet<'s>,
    pub rejected: &'r HashSet<PkgId>,
    pub config: &'r ResolveConfig,
}

impl MarkPolicy for InstallPolicy<'_, '_> {
    fn externally_satisfied(
        &mut self,
        _set: &PackageSet,
        _requirer: PkgId,
        req: &Capreq,
    ) -> Result<bool> {
        if req.is_rpmlib() {
            return Ok(true);
        }
        Ok(self.installed.provides(req)?.is_some())
    }

    fn choose(
        &mut self,
        set: &PackageSet,
        marks: &MarkSet,
        requirer: PkgId,
        candidates: &[PkgId],
    ) -> Result<Option<PkgId>> {
        let requirer = if self.config.multilib || set.package(requirer).arch.is_some() {
            Some(requirer)
        } else {
            None
        };
        select_best(set, marks, self.installed, self.rejected, requirer, candidates)
    }
}
