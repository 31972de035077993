//! Topology descriptors for the processing graph
//!
//! The graph is never mutated edge by edge. Instead a descriptor is derived
//! from `(channel count, width enablement, monitor mode)` and the difference
//! between the old and new descriptor is applied in one step.

use crate::domain::audio::ChannelCount;
use crate::domain::monitor::MonitorMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a processing stage in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageId {
    LowShelf,
    MidPeak,
    HighShelf,
    Saturation,
    Compressor,
    Limiter,
    StereoWidth,
    OutputGain,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageId::LowShelf => "low-shelf",
            StageId::MidPeak => "mid-peak",
            StageId::HighShelf => "high-shelf",
            StageId::Saturation => "saturation",
            StageId::Compressor => "compressor",
            StageId::Limiter => "limiter",
            StageId::StereoWidth => "stereo-width",
            StageId::OutputGain => "output-gain",
        };
        f.write_str(name)
    }
}

const STAGES_WITH_WIDTH: [StageId; 8] = [
    StageId::LowShelf,
    StageId::MidPeak,
    StageId::HighShelf,
    StageId::Saturation,
    StageId::Compressor,
    StageId::Limiter,
    StageId::StereoWidth,
    StageId::OutputGain,
];

const STAGES_WITHOUT_WIDTH: [StageId; 7] = [
    StageId::LowShelf,
    StageId::MidPeak,
    StageId::HighShelf,
    StageId::Saturation,
    StageId::Compressor,
    StageId::Limiter,
    StageId::OutputGain,
];

/// Stage layout of the mastering chain
///
/// Stereo width is wired in if and only if the signal is stereo and width is
/// enabled; otherwise the limiter connects straight to the output gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTopology {
    channels: ChannelCount,
    width_wired: bool,
}

impl ChainTopology {
    pub fn derive(channels: ChannelCount, width_enabled: bool) -> Self {
        Self {
            channels,
            width_wired: channels.is_stereo() && width_enabled,
        }
    }

    pub fn channels(&self) -> ChannelCount {
        self.channels
    }

    pub fn width_wired(&self) -> bool {
        self.width_wired
    }

    /// Stages in processing order
    pub fn stages(&self) -> &'static [StageId] {
        if self.width_wired {
            &STAGES_WITH_WIDTH
        } else {
            &STAGES_WITHOUT_WIDTH
        }
    }
}

/// A node of the monitoring graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Node {
    OriginalSource,
    MasteredSource,
    ReferenceSource,
    ReferenceGain,
    Stage(StageId),
    Output,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::OriginalSource => f.write_str("original"),
            Node::MasteredSource => f.write_str("mastered-source"),
            Node::ReferenceSource => f.write_str("reference"),
            Node::ReferenceGain => f.write_str("reference-gain"),
            Node::Stage(id) => write!(f, "{id}"),
            Node::Output => f.write_str("output"),
        }
    }
}

/// Directed connection between two nodes
pub type Edge = (Node, Node);

/// Full edge set of the monitoring graph for one state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphTopology {
    edges: BTreeSet<Edge>,
}

/// Edges to remove and add when moving between two topologies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    pub disconnect: Vec<Edge>,
    pub connect: Vec<Edge>,
}

impl TopologyDiff {
    pub fn is_empty(&self) -> bool {
        self.disconnect.is_empty() && self.connect.is_empty()
    }
}

impl GraphTopology {
    /// Graph with nothing connected (stopped)
    pub fn stopped() -> Self {
        Self::default()
    }

    /// Derive the edge set for a chain layout and an optional live mode
    pub fn derive(chain: ChainTopology, mode: Option<MonitorMode>) -> Self {
        let mut edges = BTreeSet::new();

        match mode {
            None => {}
            Some(MonitorMode::Original) => {
                edges.insert((Node::OriginalSource, Node::Output));
            }
            Some(MonitorMode::Mastered) => {
                let mut previous = Node::MasteredSource;
                for stage in chain.stages() {
                    let node = Node::Stage(*stage);
                    edges.insert((previous, node));
                    previous = node;
                }
                edges.insert((previous, Node::Output));
            }
            Some(MonitorMode::Reference) => {
                edges.insert((Node::ReferenceSource, Node::ReferenceGain));
                edges.insert((Node::ReferenceGain, Node::Output));
            }
        }

        Self { edges }
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn contains(&self, edge: &Edge) -> bool {
        self.edges.contains(edge)
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of edges terminating at the output sink
    pub fn output_connections(&self) -> usize {
        self.edges.iter().filter(|(_, to)| *to == Node::Output).count()
    }

    /// Edges to disconnect and connect to turn `self` into `next`
    pub fn diff(&self, next: &GraphTopology) -> TopologyDiff {
        TopologyDiff {
            disconnect: self.edges.difference(&next.edges).copied().collect(),
            connect: next.edges.difference(&self.edges).copied().collect(),
        }
    }
}
