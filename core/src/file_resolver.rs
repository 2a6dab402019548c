//! C5 File Resolver: maps a current working-tree path to its historical
//! aliases (spec.md §4.5). Returns *all* high-confidence matches rather
//! than collapsing to one, since a renamed file's incident history lives
//! under the old path.

use std::collections::HashMap;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use git2::{Repository, Sort};
use sha2::{Digest, Sha256};

use riskgraph_kernel::resolution::{ResolutionMethod, ResolvedPath};

use crate::error::FileResolverError;

pub struct FileResolver {
    repo: Repository,
}

impl FileResolver {
    pub fn open(path: &str) -> Result<Self, FileResolverError> {
        Ok(FileResolver {
            repo: Repository::open(path)?,
        })
    }

    /// Returns every known `File.path` observed in the repository's commit
    /// history, used both as the `exact` match source and as the candidate
    /// pool for `basename`/`content-similarity` matching.
    fn known_historical_paths(&self) -> Result<Vec<String>, FileResolverError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push_head()?;
        let mut seen = std::collections::HashSet::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let tree = commit.tree()?;
            tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
                if entry.kind() == Some(git2::ObjectType::Blob) {
                    let name = entry.name().unwrap_or_default();
                    seen.insert(format!("{root}{name}"));
                }
                git2::TreeWalkResult::Ok
            })?;
        }
        Ok(seen.into_iter().collect())
    }

    /// `exact` (1.0): the current path is present as a known historical
    /// path (spec.md §4.5).
    fn exact_match(&self, current_path: &str, known: &[String]) -> Option<ResolvedPath> {
        known.iter().find(|p| p.as_str() == current_path).map(|_| ResolvedPath {
            historical_path: current_path.to_string(),
            confidence: 1.0,
            method: ResolutionMethod::Exact,
        })
    }

    /// `git-follow` (0.95): follows Git's own rename detection through the
    /// commits touching `current_path` (spec.md §4.5).
    fn git_follow_matches(&self, current_path: &str) -> Result<Vec<ResolvedPath>, FileResolverError> {
        let mut diffopts = git2::DiffOptions::new();
        diffopts.pathspec(current_path);

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push_head()?;

        let mut matches = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            if commit.parent_count() == 0 {
                continue;
            }
            let parent = commit.parent(0)?;
            let mut find_opts = git2::DiffFindOptions::new();
            find_opts.renames(true);
            let mut diff = self.repo.diff_tree_to_tree(
                Some(&parent.tree()?),
                Some(&commit.tree()?),
                None,
            )?;
            diff.find_similar(Some(&mut find_opts))?;
            for delta in diff.deltas() {
                let new_path = delta.new_file().path().and_then(|p| p.to_str());
                let old_path = delta.old_file().path().and_then(|p| p.to_str());
                if new_path == Some(current_path) {
                    if let Some(old) = old_path {
                        if old != current_path && seen.insert(old.to_string()) {
                            matches.push(ResolvedPath {
                                historical_path: old.to_string(),
                                confidence: 0.95,
                                method: ResolutionMethod::GitFollow,
                            });
                        }
                    }
                }
            }
        }
        Ok(matches)
    }

    /// `content-similarity` (0.5-0.85): compares content hashes of
    /// near-deletion/near-add pairs within the same commit (spec.md §4.5).
    /// A coarse signal: identical content under a different name in the
    /// same commit is treated as the strongest content-similarity match;
    /// there is no partial-similarity scoring without a real diff library,
    /// so this method only ever returns exact-content matches at the top
    /// of its range.
    fn content_similarity_matches(
        &self,
        current_path: &str,
        known: &[String],
    ) -> Result<Vec<ResolvedPath>, FileResolverError> {
        let head = self.repo.head()?.peel_to_commit()?;
        let tree = head.tree()?;
        let current_blob = tree
            .get_path(std::path::Path::new(current_path))
            .ok()
            .and_then(|entry| self.repo.find_blob(entry.id()).ok());
        let Some(current_blob) = current_blob else {
            return Ok(Vec::new());
        };
        let current_hash = hash_bytes(current_blob.content());

        let mut matches = Vec::new();
        for candidate in known {
            if candidate == current_path {
                continue;
            }
            if let Ok(entry) = tree.get_path(std::path::Path::new(candidate)) {
                if let Ok(blob) = self.repo.find_blob(entry.id()) {
                    if hash_bytes(blob.content()) == current_hash {
                        matches.push(ResolvedPath {
                            historical_path: candidate.clone(),
                            confidence: 0.85,
                            method: ResolutionMethod::ContentSimilarity,
                        });
                    }
                }
            }
        }
        Ok(matches)
    }

    /// `basename` (0.3-0.5): last-resort filename match (spec.md §4.5).
    fn basename_matches(&self, current_path: &str, known: &[String]) -> Vec<ResolvedPath> {
        let matcher = SkimMatcherV2::default();
        let current_basename = std::path::Path::new(current_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(current_path);

        let mut scored: Vec<(i64, &String)> = known
            .iter()
            .filter(|p| p.as_str() != current_path)
            .filter_map(|p| {
                let basename = std::path::Path::new(p.as_str())
                    .file_name()
                    .and_then(|n| n.to_str())?;
                matcher.fuzzy_match(basename, current_basename).map(|score| (score, p))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let max_score = scored.first().map(|(s, _)| *s).unwrap_or(1).max(1) as f64;
        scored
            .into_iter()
            .filter(|(score, _)| *score > 0)
            .map(|(score, path)| ResolvedPath {
                historical_path: path.clone(),
                confidence: ResolutionMethod::Basename
                    .clamp_to_range(0.3 + 0.2 * (score as f64 / max_score)),
                method: ResolutionMethod::Basename,
            })
            .collect()
    }

    /// Resolves `current_path` to every high-confidence historical alias,
    /// running all four methods and deduplicating by historical path,
    /// preferring the highest-confidence method tag for a given path
    /// (spec.md §4.5 "Contract": never collapse to a single path).
    pub fn resolve(&self, current_path: &str) -> Result<Vec<ResolvedPath>, FileResolverError> {
        let known = self.known_historical_paths()?;

        let mut best: HashMap<String, ResolvedPath> = HashMap::new();
        let mut add = |rp: ResolvedPath| {
            best.entry(rp.historical_path.clone())
                .and_modify(|existing| {
                    if rp.confidence > existing.confidence {
                        *existing = rp.clone();
                    }
                })
                .or_insert(rp);
        };

        if let Some(exact) = self.exact_match(current_path, &known) {
            add(exact);
        }
        for m in self.git_follow_matches(current_path)? {
            add(m);
        }
        for m in self.content_similarity_matches(current_path, &known)? {
            add(m);
        }
        for m in self.basename_matches(current_path, &known) {
            add(m);
        }

        let mut out: Vec<ResolvedPath> = best.into_values().collect();
        out.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        Ok(out)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
