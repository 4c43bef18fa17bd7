
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strum_macros::EnumString;

use crate::data_types::site::{SequencingMode, VariantClass};

/// Supported upstream callers.
/// The string form is the tag used in feature column names, INFO/SOURCES, and headers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize, strum_macros::Display, EnumString)]
pub enum CallerTag {
    MuTect,
    MuTect2,
    VarScan2,
    JointSNVMix2,
    SomaticSniper,
    VarDict,
    MuSE,
    LoFreq,
    Scalpel,
    Strelka,
    TNscope,
    Platypus
}

/// Identity of a caller within a run: a supported caller, or an arbitrary extra VCF in a numbered slot
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum CallerId {
    Known(CallerTag),
    Arbitrary { class: VariantClass, index: usize }
}

impl CallerId {
    /// Returns the supported caller tag, if any
    pub fn tag(&self) -> Option<CallerTag> {
        match self {
            CallerId::Known(tag) => Some(*tag),
            CallerId::Arbitrary { .. } => None
        }
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallerId::Known(tag) => write!(f, "{tag}"),
            CallerId::Arbitrary { class: VariantClass::Snv, index } => write!(f, "SnvCaller_{index}"),
            CallerId::Arbitrary { class: VariantClass::Indel, index } => write!(f, "IndelCaller_{index}")
        }
    }
}

/// Named input file slots that callers can be fed from.
/// Single-sample runs fill the SNV and indel slot of a caller with the same file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize, strum_macros::Display)]
pub enum InputSlot {
    Mutect,
    Indelocator,
    Mutect2,
    VarscanSnv,
    VarscanIndel,
    Jsm,
    Sniper,
    Vardict,
    Muse,
    LofreqSnv,
    LofreqIndel,
    Scalpel,
    StrelkaSnv,
    StrelkaIndel,
    Tnscope,
    Platypus
}

/// One row of the roster table: a caller tag and the input slots that can feed it, in priority order
pub struct RosterEntry {
    pub tag: CallerTag,
    pub sources: &'static [InputSlot]
}

const fn entry(tag: CallerTag, sources: &'static [InputSlot]) -> RosterEntry {
    RosterEntry { tag, sources }
}

const PAIRED_SNV_ROSTER: &[RosterEntry] = &[
    entry(CallerTag::MuTect, &[InputSlot::Mutect2, InputSlot::Mutect]),
    entry(CallerTag::VarScan2, &[InputSlot::VarscanSnv]),
    entry(CallerTag::JointSNVMix2, &[InputSlot::Jsm]),
    entry(CallerTag::SomaticSniper, &[InputSlot::Sniper]),
    entry(CallerTag::VarDict, &[InputSlot::Vardict]),
    entry(CallerTag::MuSE, &[InputSlot::Muse]),
    entry(CallerTag::LoFreq, &[InputSlot::LofreqSnv]),
    entry(CallerTag::Strelka, &[InputSlot::StrelkaSnv]),
    entry(CallerTag::TNscope, &[InputSlot::Tnscope]),
    entry(CallerTag::Platypus, &[InputSlot::Platypus]),
];

const PAIRED_INDEL_ROSTER: &[RosterEntry] = &[
    entry(CallerTag::MuTect, &[InputSlot::Mutect2, InputSlot::Indelocator]),
    entry(CallerTag::VarScan2, &[InputSlot::VarscanIndel]),
    entry(CallerTag::VarDict, &[InputSlot::Vardict]),
    entry(CallerTag::LoFreq, &[InputSlot::LofreqIndel]),
    entry(CallerTag::Scalpel, &[InputSlot::Scalpel]),
    entry(CallerTag::Strelka, &[InputSlot::StrelkaIndel]),
    entry(CallerTag::TNscope, &[InputSlot::Tnscope]),
    entry(CallerTag::Platypus, &[InputSlot::Platypus]),
];

const SINGLE_SNV_ROSTER: &[RosterEntry] = &[
    entry(CallerTag::MuTect, &[InputSlot::Mutect2, InputSlot::Mutect]),
    entry(CallerTag::VarScan2, &[InputSlot::VarscanSnv]),
    entry(CallerTag::VarDict, &[InputSlot::Vardict]),
    entry(CallerTag::LoFreq, &[InputSlot::LofreqSnv]),
    entry(CallerTag::Strelka, &[InputSlot::StrelkaSnv]),
];

const SINGLE_INDEL_ROSTER: &[RosterEntry] = &[
    entry(CallerTag::MuTect2, &[InputSlot::Mutect2]),
    entry(CallerTag::VarScan2, &[InputSlot::VarscanIndel]),
    entry(CallerTag::VarDict, &[InputSlot::Vardict]),
    entry(CallerTag::LoFreq, &[InputSlot::LofreqIndel]),
    entry(CallerTag::Scalpel, &[InputSlot::Scalpel]),
    entry(CallerTag::Strelka, &[InputSlot::StrelkaIndel]),
];

/// Returns the fixed roster table for a class and sequencing mode
pub fn roster_table(class: VariantClass, mode: SequencingMode) -> &'static [RosterEntry] {
    match (mode, class) {
        (SequencingMode::Paired, VariantClass::Snv) => PAIRED_SNV_ROSTER,
        (SequencingMode::Paired, VariantClass::Indel) => PAIRED_INDEL_ROSTER,
        (SequencingMode::Single, VariantClass::Snv) => SINGLE_SNV_ROSTER,
        (SequencingMode::Single, VariantClass::Indel) => SINGLE_INDEL_ROSTER
    }
}

/// All caller files supplied for a run, keyed by input slot
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CallerInputs {
    /// Files for the supported callers
    files: BTreeMap<InputSlot, PathBuf>,
    /// Extra substitution VCFs, become `SnvCaller_0`, `SnvCaller_1`, ...
    arbitrary_snvs: Vec<PathBuf>,
    /// Extra indel VCFs, become `IndelCaller_0`, `IndelCaller_1`, ...
    arbitrary_indels: Vec<PathBuf>
}

impl CallerInputs {
    /// Sets a slot if a file was provided
    pub fn set(&mut self, slot: InputSlot, path: Option<&Path>) {
        if let Some(p) = path {
            self.files.insert(slot, p.to_path_buf());
        }
    }

    /// Appends arbitrary caller files for a class
    pub fn add_arbitrary(&mut self, class: VariantClass, paths: &[PathBuf]) {
        match class {
            VariantClass::Snv => self.arbitrary_snvs.extend(paths.iter().cloned()),
            VariantClass::Indel => self.arbitrary_indels.extend(paths.iter().cloned())
        }
    }

    pub fn get(&self, slot: InputSlot) -> Option<&Path> {
        self.files.get(&slot).map(|p| p.as_path())
    }

    pub fn arbitrary(&self, class: VariantClass) -> &[PathBuf] {
        match class {
            VariantClass::Snv => &self.arbitrary_snvs,
            VariantClass::Indel => &self.arbitrary_indels
        }
    }

    /// Every distinct file referenced, used for existence checks
    pub fn all_files(&self) -> Vec<&Path> {
        let mut ret: Vec<&Path> = self.files.values().map(|p| p.as_path()).collect();
        ret.extend(self.arbitrary_snvs.iter().map(|p| p.as_path()));
        ret.extend(self.arbitrary_indels.iter().map(|p| p.as_path()));
        ret.sort();
        ret.dedup();
        ret
    }
}

/// A roster position: the caller and the file feeding it, if that caller was run
#[derive(Clone, Debug)]
pub struct RosterSlot {
    caller: CallerId,
    input: Option<PathBuf>
}

impl RosterSlot {
    // getters
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }
}

/// The resolved roster for one (class, mode) pair.
/// The full roster fixes feature column order; the active subset fixes vote order and the consensus denominator.
#[derive(Clone, Debug)]
pub struct CallerRoster {
    class: VariantClass,
    mode: SequencingMode,
    slots: Vec<RosterSlot>
}

impl CallerRoster {
    /// Folds the fixed roster table over the supplied inputs.
    /// The first present slot of each entry feeds that caller; arbitrary callers are appended after the table.
    /// # Arguments
    /// * `class` - the variant class being adjudicated
    /// * `mode` - paired or single-sample
    /// * `inputs` - all caller files for the run
    pub fn resolve(class: VariantClass, mode: SequencingMode, inputs: &CallerInputs) -> Self {
        let known = roster_table(class, mode).iter()
            .map(|e| RosterSlot {
                caller: CallerId::Known(e.tag),
                input: e.sources.iter()
                    .find_map(|&slot| inputs.get(slot))
                    .map(|p| p.to_path_buf())
            });

        let arbitrary = inputs.arbitrary(class).iter()
            .enumerate()
            .map(|(index, p)| RosterSlot {
                caller: CallerId::Arbitrary { class, index },
                input: Some(p.clone())
            });

        Self {
            class,
            mode,
            slots: known.chain(arbitrary).collect()
        }
    }

    /// Callers that were run, in vote order, paired with their input file
    pub fn active(&self) -> impl Iterator<Item = (&CallerId, &Path)> {
        self.slots.iter()
            .filter_map(|s| s.input.as_deref().map(|p| (&s.caller, p)))
    }

    /// Callers that were run, in vote order
    pub fn active_callers(&self) -> Vec<CallerId> {
        self.active().map(|(c, _p)| c.clone()).collect()
    }

    /// The consensus denominator
    pub fn num_active(&self) -> usize {
        self.active().count()
    }

    /// Number of arbitrary callers, which is part of the feature schema identity
    pub fn num_arbitrary(&self) -> usize {
        self.slots.iter()
            .filter(|s| matches!(s.caller, CallerId::Arbitrary { .. }))
            .count()
    }

    // getters
    pub fn class(&self) -> VariantClass {
        self.class
    }

    pub fn mode(&self) -> SequencingMode {
        self.mode
    }

    pub fn slots(&self) -> &[RosterSlot] {
        &self.slots
    }
}
