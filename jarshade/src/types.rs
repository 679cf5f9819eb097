#[derive(Debug)]
pub struct ShadeEvent {
    pub stage: Stage,
    pub progress: StageProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadingManifests,
    MergingArchives,
    WritingTransformedResources,
    ReportingOverlaps,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ReadingManifests => "Reading Manifests",
            Stage::MergingArchives => "Merging Archives",
            Stage::WritingTransformedResources => "Writing Transformed Resources",
            Stage::ReportingOverlaps => "Reporting Overlaps",
        }
    }
}

impl From<Stage> for ShadeEvent {
    fn from(value: Stage) -> Self {
        ShadeEvent {
            stage: value,
            progress: StageProgress::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageProgress {
    Unknown,
    Percentage(f32),
    Done,
}
