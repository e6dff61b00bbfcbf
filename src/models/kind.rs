//! The fixed table of preparation kinds and their step sequences.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One transformation applied to a working file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    RewriteMultilineMacros,
    DeleteComments,
    DeleteWhitespace,
    RewriteIfdefs,
    RemoveIncludeGuards,
    RemoveOtherPreprocessor,
    DeleteEmptyLines,
    FormatCode,
    TransformToSrcml,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::RewriteMultilineMacros => "macros",
            Step::DeleteComments => "comments",
            Step::DeleteWhitespace => "whitespace",
            Step::RewriteIfdefs => "ifdefs",
            Step::RemoveIncludeGuards => "include-guards",
            Step::RemoveOtherPreprocessor => "other-preprocessor",
            Step::DeleteEmptyLines => "empty-lines",
            Step::FormatCode => "format",
            Step::TransformToSrcml => "srcml",
        }
    }

    /// Whether a `.bak<N>` snapshot is taken before the step runs.
    ///
    /// The srcml transformation writes a new file and leaves its input alone.
    pub fn takes_backup(self) -> bool {
        !matches!(self, Step::TransformToSrcml)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const GENERAL_STEPS: &[Step] = &[
    Step::RewriteMultilineMacros,
    Step::DeleteComments,
    Step::DeleteWhitespace,
    Step::RewriteIfdefs,
    Step::RemoveIncludeGuards,
    Step::DeleteEmptyLines,
    Step::TransformToSrcml,
];

const DISCIPLINE_STEPS: &[Step] = &[
    Step::RewriteMultilineMacros,
    Step::DeleteComments,
    Step::DeleteWhitespace,
    Step::RewriteIfdefs,
    Step::RemoveIncludeGuards,
    Step::RemoveOtherPreprocessor,
    Step::DeleteEmptyLines,
    Step::TransformToSrcml,
];

const FEATURE_LOCATION_STEPS: &[Step] = &[
    Step::RewriteMultilineMacros,
    Step::DeleteComments,
    Step::DeleteWhitespace,
    Step::RewriteIfdefs,
    Step::TransformToSrcml,
];

const PRETTY_STEPS: &[Step] = &[Step::RewriteMultilineMacros, Step::FormatCode];

/// A named, fixed pipeline applied to every source file of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreparationKind {
    General,
    Discipline,
    FeatureLocations,
    Pretty,
}

impl PreparationKind {
    /// Every kind, in the order `--all-kinds` runs them.
    pub const ALL: [PreparationKind; 4] = [
        PreparationKind::General,
        PreparationKind::Discipline,
        PreparationKind::FeatureLocations,
        PreparationKind::Pretty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PreparationKind::General => "general",
            PreparationKind::Discipline => "discipline",
            PreparationKind::FeatureLocations => "featurelocations",
            PreparationKind::Pretty => "pretty",
        }
    }

    /// Output folder inside a project directory.
    pub fn subfolder(self) -> &'static str {
        match self {
            PreparationKind::General => "_cppstats",
            PreparationKind::Discipline => "_cppstats_discipline",
            PreparationKind::FeatureLocations => "_cppstats_featurelocations",
            PreparationKind::Pretty => "_cppstats_pretty",
        }
    }

    pub fn steps(self) -> &'static [Step] {
        match self {
            PreparationKind::General => GENERAL_STEPS,
            PreparationKind::Discipline => DISCIPLINE_STEPS,
            PreparationKind::FeatureLocations => FEATURE_LOCATION_STEPS,
            PreparationKind::Pretty => PRETTY_STEPS,
        }
    }

    /// Whether the final result is a srcML document next to the working file.
    pub fn produces_xml(self) -> bool {
        !matches!(self, PreparationKind::Pretty)
    }

    /// Final result for a working file named `current`.
    pub fn result_path(self, current: &Utf8Path) -> Utf8PathBuf {
        if self.produces_xml() {
            Utf8PathBuf::from(format!("{current}.xml"))
        } else {
            current.to_path_buf()
        }
    }
}

impl fmt::Display for PreparationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognised kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown preparation kind '{0}' (expected one of: general, discipline, featurelocations, pretty)")]
pub struct UnknownKind(pub String);

impl FromStr for PreparationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreparationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for kind in PreparationKind::ALL {
            assert_eq!(kind.name().parse::<PreparationKind>().unwrap(), kind);
        }
        assert!("General".parse::<PreparationKind>().is_err());
    }

    #[test]
    fn test_result_naming() {
        let file = Utf8Path::new("proj/_cppstats/a.c");
        assert_eq!(
            PreparationKind::General.result_path(file),
            Utf8PathBuf::from("proj/_cppstats/a.c.xml")
        );
        assert_eq!(PreparationKind::Pretty.result_path(file), file);
    }

    #[test]
    fn test_discipline_adds_other_preprocessor_before_empty_lines() {
        let steps = PreparationKind::Discipline.steps();
        let other = steps
            .iter()
            .position(|s| *s == Step::RemoveOtherPreprocessor)
            .unwrap();
        assert_eq!(steps[other + 1], Step::DeleteEmptyLines);
        assert_eq!(steps.len(), PreparationKind::General.steps().len() + 1);
    }

    #[test]
    fn test_every_xml_kind_ends_with_srcml() {
        for kind in PreparationKind::ALL {
            let last = *kind.steps().last().unwrap();
            assert_eq!(last == Step::TransformToSrcml, kind.produces_xml());
        }
    }

    #[test]
    fn test_only_srcml_skips_backup() {
        assert!(!Step::TransformToSrcml.takes_backup());
        assert!(Step::FormatCode.takes_backup());
        assert!(Step::RemoveIncludeGuards.takes_backup());
    }
}
