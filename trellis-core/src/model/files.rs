//! Model-directory probing.
//!
//! Two on-disk layouts are supported:
//!
//! - **v2** — consolidated: `am/final.mdl`, `conf/model.conf`,
//!   `graph/HCLG.fst` (or `graph/HCLr.fst` + `graph/Gr.fst` +
//!   `graph/disambig_tid.int`), `graph/words.txt`,
//!   `graph/phones/word_boundary.int`, `rescore/`, `ivector/`, `rnnlm/`.
//! - **v1** — flat: `final.mdl`, `mfcc.conf`, `HCLG.fst`, `words.txt`,
//!   `word_boundary.int`, `rescore/`, ...
//!
//! Probing is purely `stat`-based; reading and parsing the files is the
//! model store's job. Construction fails before any store is invoked when
//! neither layout is present or no decoding-graph representation exists.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, TrellisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Flat layout without `conf/model.conf`.
    V1,
    /// Consolidated layout with `conf/model.conf`.
    V2,
}

/// Which decoding-graph representation the bundle carries. Exactly one is
/// available; absence of both is a fatal construction error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSpec {
    Precomposed { hclg_fst: PathBuf },
    /// Composed on demand with lookahead from the two sub-graphs plus the
    /// disambiguation-symbol list.
    Split {
        hclr_fst: PathBuf,
        gr_fst: PathBuf,
        disambig_int: PathBuf,
    },
}

/// Resolved component paths for one probed model directory.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub root: PathBuf,
    pub layout: LayoutKind,
    pub final_mdl: PathBuf,
    pub graph: GraphSpec,
    pub words_txt: PathBuf,
    pub model_conf: Option<PathBuf>,
    pub mfcc_conf: Option<PathBuf>,
    pub fbank_conf: Option<PathBuf>,
    pub global_cmvn_stats: Option<PathBuf>,
    pub word_boundary_int: Option<PathBuf>,
    pub ivector_extractor: Option<PathBuf>,
    /// Baseline graph LM to subtract during rescoring.
    pub rescore_g_fst: Option<PathBuf>,
    /// Higher-order LM to add during rescoring.
    pub rescore_g_carpa: Option<PathBuf>,
    /// Neural LM directory (`final.raw`, `word_feats.txt`, ...).
    pub neural_lm_dir: Option<PathBuf>,
}

impl ModelFiles {
    /// Probe `dir` for a supported layout and resolve every component path.
    ///
    /// # Errors
    /// - `ModelLayout` when neither layout's required files are present.
    /// - `GraphMissing` when no decoding-graph representation exists.
    pub fn probe(dir: impl AsRef<Path>) -> Result<ModelFiles> {
        let root = dir.as_ref().to_path_buf();

        let layout = if root.join("am/final.mdl").is_file() && root.join("conf/model.conf").is_file()
        {
            LayoutKind::V2
        } else if root.join("final.mdl").is_file() && root.join("mfcc.conf").is_file() {
            LayoutKind::V1
        } else {
            return Err(TrellisError::ModelLayout { path: root });
        };

        let (graph_dir, am_dir, conf_dir, wb_rel) = match layout {
            LayoutKind::V2 => ("graph", "am", "conf", "graph/phones/word_boundary.int"),
            LayoutKind::V1 => ("", "", "", "word_boundary.int"),
        };
        let join = |base: &str, name: &str| -> PathBuf {
            if base.is_empty() {
                root.join(name)
            } else {
                root.join(base).join(name)
            }
        };

        let graph = Self::probe_graph(&root, graph_dir)?;

        let words_txt = join(graph_dir, "words.txt");
        if !words_txt.is_file() {
            return Err(TrellisError::ModelLoad(format!(
                "missing word symbol table: {}",
                words_txt.display()
            )));
        }

        let optional = |p: PathBuf| -> Option<PathBuf> { p.is_file().then_some(p) };
        let optional_dir = |p: PathBuf| -> Option<PathBuf> { p.is_dir().then_some(p) };

        let rescore_g_fst = optional(root.join("rescore/G.fst"));
        let rescore_g_carpa = optional(root.join("rescore/G.carpa"));
        // The subtract/add pair is all-or-nothing; a lone half is ignored.
        let (rescore_g_fst, rescore_g_carpa) = match (rescore_g_fst, rescore_g_carpa) {
            (Some(f), Some(c)) => (Some(f), Some(c)),
            (None, None) => (None, None),
            (Some(_), None) | (None, Some(_)) => {
                warn!(
                    root = %root.display(),
                    "incomplete rescore pair (need both G.fst and G.carpa) — rescoring disabled"
                );
                (None, None)
            }
        };

        let neural_lm_dir = optional_dir(root.join("rnnlm"))
            .filter(|d| d.join("final.raw").is_file() && d.join("word_feats.txt").is_file());
        // Neural rescoring rides on top of the LM pair; alone it is unusable.
        let neural_lm_dir = if neural_lm_dir.is_some() && rescore_g_fst.is_none() {
            warn!(
                root = %root.display(),
                "neural LM present without a rescore pair — neural rescoring disabled"
            );
            None
        } else {
            neural_lm_dir
        };

        let files = ModelFiles {
            final_mdl: join(am_dir, "final.mdl"),
            graph,
            words_txt,
            model_conf: optional(join(conf_dir, "model.conf")),
            mfcc_conf: optional(join(conf_dir, "mfcc.conf")),
            fbank_conf: optional(join(conf_dir, "fbank.conf")),
            global_cmvn_stats: optional(join(am_dir, "global_cmvn.stats")),
            word_boundary_int: optional(root.join(wb_rel)),
            ivector_extractor: optional(root.join("ivector/final.ie")),
            rescore_g_fst,
            rescore_g_carpa,
            neural_lm_dir,
            layout,
            root,
        };

        debug!(
            root = %files.root.display(),
            layout = ?files.layout,
            split_graph = files.has_split_graph(),
            rescore = files.has_rescore_pair(),
            neural = files.neural_lm_dir.is_some(),
            "model layout probed"
        );
        Ok(files)
    }

    fn probe_graph(root: &Path, graph_dir: &str) -> Result<GraphSpec> {
        let join = |name: &str| -> PathBuf {
            if graph_dir.is_empty() {
                root.join(name)
            } else {
                root.join(graph_dir).join(name)
            }
        };

        let hclg = join("HCLG.fst");
        if hclg.is_file() {
            return Ok(GraphSpec::Precomposed { hclg_fst: hclg });
        }

        let hclr = join("HCLr.fst");
        let gr = join("Gr.fst");
        let disambig = join("disambig_tid.int");
        if hclr.is_file() && gr.is_file() && disambig.is_file() {
            return Ok(GraphSpec::Split {
                hclr_fst: hclr,
                gr_fst: gr,
                disambig_int: disambig,
            });
        }

        Err(TrellisError::GraphMissing {
            path: root.to_path_buf(),
        })
    }

    pub fn has_split_graph(&self) -> bool {
        matches!(self.graph, GraphSpec::Split { .. })
    }

    pub fn has_rescore_pair(&self) -> bool {
        self.rescore_g_fst.is_some() && self.rescore_g_carpa.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TempModelDir(PathBuf);

    impl TempModelDir {
        fn new(tag: &str) -> Self {
            static COUNTER: AtomicU32 = AtomicU32::new(0);
            let dir = std::env::temp_dir().join(format!(
                "trellis-files-{}-{}-{}",
                tag,
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn touch(&self, rel: &str) {
            let path = self.0.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }
    }

    impl Drop for TempModelDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn v2_base(dir: &TempModelDir) {
        dir.touch("am/final.mdl");
        dir.touch("conf/model.conf");
        dir.touch("graph/HCLG.fst");
        dir.touch("graph/words.txt");
    }

    #[test]
    fn probes_v2_layout() {
        let dir = TempModelDir::new("v2");
        v2_base(&dir);
        dir.touch("graph/phones/word_boundary.int");

        let files = ModelFiles::probe(&dir.0).unwrap();
        assert_eq!(files.layout, LayoutKind::V2);
        assert!(matches!(files.graph, GraphSpec::Precomposed { .. }));
        assert!(files.word_boundary_int.is_some());
        assert!(!files.has_rescore_pair());
    }

    #[test]
    fn probes_v1_layout() {
        let dir = TempModelDir::new("v1");
        dir.touch("final.mdl");
        dir.touch("mfcc.conf");
        dir.touch("HCLG.fst");
        dir.touch("words.txt");

        let files = ModelFiles::probe(&dir.0).unwrap();
        assert_eq!(files.layout, LayoutKind::V1);
        assert_eq!(files.mfcc_conf, Some(dir.0.join("mfcc.conf")));
    }

    #[test]
    fn missing_layout_is_fatal() {
        let dir = TempModelDir::new("none");
        dir.touch("README");
        let err = ModelFiles::probe(&dir.0).unwrap_err();
        assert!(matches!(err, TrellisError::ModelLayout { .. }));
        assert!(err.to_string().contains("does not contain model files"));
    }

    #[test]
    fn split_graph_needs_all_three_files() {
        let dir = TempModelDir::new("split");
        dir.touch("am/final.mdl");
        dir.touch("conf/model.conf");
        dir.touch("graph/words.txt");
        dir.touch("graph/HCLr.fst");
        dir.touch("graph/Gr.fst");
        // disambig_tid.int missing → no usable graph at all
        let err = ModelFiles::probe(&dir.0).unwrap_err();
        assert!(matches!(err, TrellisError::GraphMissing { .. }));

        dir.touch("graph/disambig_tid.int");
        let files = ModelFiles::probe(&dir.0).unwrap();
        assert!(files.has_split_graph());
    }

    #[test]
    fn lone_rescore_half_is_dropped() {
        let dir = TempModelDir::new("halfpair");
        v2_base(&dir);
        dir.touch("rescore/G.fst");

        let files = ModelFiles::probe(&dir.0).unwrap();
        assert!(!files.has_rescore_pair());
        assert!(files.rescore_g_fst.is_none());
    }

    #[test]
    fn neural_lm_requires_rescore_pair() {
        let dir = TempModelDir::new("neural");
        v2_base(&dir);
        dir.touch("rnnlm/final.raw");
        dir.touch("rnnlm/word_feats.txt");

        let files = ModelFiles::probe(&dir.0).unwrap();
        assert!(files.neural_lm_dir.is_none());

        dir.touch("rescore/G.fst");
        dir.touch("rescore/G.carpa");
        let files = ModelFiles::probe(&dir.0).unwrap();
        assert!(files.has_rescore_pair());
        assert!(files.neural_lm_dir.is_some());
    }
}
