#![doc = include_str!("../README.md")]

mod error;
mod index;
mod keys;
mod reconcile;
mod report;
mod results;
mod tree;

pub mod v1 {
    //! Versioned public API for test trees built from Ginkgo reports.
    //!
    //! # Reports
    //!
    //! - [`ReportReader`] — parse the runner's JSON report (strict or lenient)
    //! - [`SuiteReport`], [`SpecEntry`], [`Location`], [`SpecState`] — normalized report contents
    //!
    //! # Tree
    //!
    //! - [`TestTree`] — id-keyed arena of suites, containers and leaves
    //! - [`TreeNode`], [`NodeKind`] — a node and its kind-specific metadata
    //! - [`LookupIndex`] — leaf key to node id, group key to leaf keys
    //!
    //! # Passes
    //!
    //! - [`reconcile`] — build or update the tree from a discovery report
    //! - [`results`] — map a run report onto statuses ([`TestStatus`])
    //! - [`keys`] — pure key derivation shared by both
    //!
    //! # Example — discover, then apply a run
    //!
    //! ```
    //! use std::path::Path;
    //! use spectree::v1::*;
    //!
    //! let json = r#"[{
    //!   "SuitePath": "/pkg/widgets_suite_test.go",
    //!   "SuiteDescription": "Widgets Suite",
    //!   "SpecReports": [{
    //!     "ContainerHierarchyTexts": ["Widget"],
    //!     "LeafNodeText": "creates correctly",
    //!     "LeafNodeLocation": {"FileName": "/pkg/widget_test.go", "LineNumber": 42},
    //!     "State": "passed"
    //!   }]
    //! }]"#;
    //!
    //! let reports = ReportReader::parse_lenient(json);
    //! let root = Path::new("/");
    //! let mut tree = TestTree::new();
    //! let mut index = LookupIndex::new();
    //! reconcile::reconcile_all(&mut tree, &mut index, root, &reports);
    //! assert_eq!(tree.len(), 3);
    //!
    //! let run = RunResults::from_reports(&reports, root);
    //! let target = "/pkg/widgets_suite_test.go";
    //! let updates = results::map_results(&tree, &index, target, &run, Some(0));
    //! assert!(updates.iter().all(|u| u.status == TestStatus::Passed));
    //! ```

    /// Pure key derivation for suites, containers and leaves.
    pub mod keys {
        pub use crate::keys::{
            KEY_DELIMITER, container_key, escape_segment, fallback_leaf_key, leaf_key,
            location_key, normalize_path, resolve, resolve_location_file, suite_dir, suite_key,
        };
    }

    /// Discovery passes: build the tree from reports, reusing ids across passes.
    pub mod reconcile {
        pub use crate::reconcile::{DiscoveryPass, SuitePass, reconcile_all, reconcile_suite};
    }

    /// Run passes: turn a run report into per-node statuses.
    pub mod results {
        pub use crate::results::{DEFAULT_FAILURE, map_results};
    }

    pub use crate::error::{ReportError, Result};
    pub use crate::index::LookupIndex;
    pub use crate::reconcile::{DiscoveryPass, SuitePass};
    pub use crate::report::{
        Location, ReportReader, SpecEntry, SpecState, SuiteReport, UNNAMED_LEAF,
    };
    pub use crate::results::{RunResults, SpecOutcome, StatusUpdate, TestStatus};
    pub use crate::tree::{
        ContainerMeta, LeafMeta, LineRange, NodeKind, NodeView, SourceLocation, SuiteMeta,
        TestTree, TreeNode,
    };
}
