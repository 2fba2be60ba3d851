//! 配置构建
//!
//! 把 `PlaylistSpec` 转成回放所需的运行期结构。所有构造期错误都在这里暴露，
//! 返回 `Err` 时不会留下半成品。

use super::spec::{FlowSpec, ModifierKindSpec, ModifierSpec, PlaylistDefaults, PlaylistSpec};
use crate::error::{Error, Result};
use crate::flow::{
    DEFAULT_INACTIVITY_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS, FlowConfig, FlowTiming, PlayType,
};
use crate::modifier::{Modifier, ModifierBlock, ModifierError, RangeModifier, TableModifier};
use crate::packet::{PacketTemplate, VarValues, Variable};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 回放链路的默认单向时延（毫秒）
pub const DEFAULT_LINK_LATENCY_MS: u64 = 1;

/// playlist 中的一个流
#[derive(Debug, Clone)]
pub struct FlowEntry {
    pub config: Arc<FlowConfig>,
    pub timing: FlowTiming,
    pub var_values: VarValues,
    pub start_ms: u64,
}

/// 校验过的流级循环区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRange {
    pub begin: usize,
    pub end: usize,
    pub count: u32,
}

impl LoopRange {
    pub fn contains(&self, flow_idx: usize) -> bool {
        (self.begin..=self.end).contains(&flow_idx)
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    pub play_type: PlayType,
    pub iterations: u64,
    pub link_latency_ms: u64,
    pub flows: Vec<FlowEntry>,
    pub loops: Vec<LoopRange>,
    pub modifiers: ModifierBlock,
}

impl PlaylistConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let spec: PlaylistSpec = serde_json::from_str(raw)?;
        spec.build()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

impl PlaylistSpec {
    /// 校验并构建运行期 playlist。
    #[tracing::instrument(skip(self), fields(kind = ?self.kind, flows = self.flows.len()))]
    pub fn build(&self) -> Result<PlaylistConfig> {
        if self.schema_version != 1 {
            return Err(Error::Config(format!(
                "unsupported schema_version {}",
                self.schema_version
            )));
        }
        let defaults = self.defaults.clone().unwrap_or_default();
        let mut modifiers = ModifierBlock::new(self.seed.unwrap_or(0));

        let mut flows = Vec::with_capacity(self.flows.len());
        for (flow_idx, spec) in self.flows.iter().enumerate() {
            let entry = build_flow(flow_idx, spec, self.kind, &defaults)?;
            add_modifiers(&mut modifiers, flow_idx, &spec.modifiers, &entry.config.variables)?;
            flows.push(entry);
        }

        let loops = build_loops(self, flows.len())?;
        let iterations = self.iterations.unwrap_or(1);
        if iterations == 0 {
            return Err(Error::Config("iterations must be at least 1".to_string()));
        }

        info!(
            flows = flows.len(),
            loops = loops.len(),
            modifiers = modifiers.len(),
            iterations,
            "playlist 构建完成"
        );
        Ok(PlaylistConfig {
            play_type: self.kind,
            iterations,
            link_latency_ms: defaults.link_latency_ms.unwrap_or(DEFAULT_LINK_LATENCY_MS),
            flows,
            loops,
            modifiers,
        })
    }
}

fn build_flow(
    flow_idx: usize,
    spec: &FlowSpec,
    play_type: PlayType,
    defaults: &PlaylistDefaults,
) -> Result<FlowEntry> {
    let packets = spec
        .packets
        .iter()
        .map(|p| -> Result<PacketTemplate> {
            let data = hex::decode(&p.data)?;
            let pkt = PacketTemplate::new(data, p.delay_ms.unwrap_or(0), p.client_tx);
            Ok(match p.loop_info {
                Some(l) => pkt.with_loop(l.begin, l.count),
                None => pkt,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let variables = spec
        .variables
        .iter()
        .map(|v| -> Result<Variable> {
            Ok(Variable {
                default: hex::decode(&v.default)?,
                endian: v.endian.unwrap_or_default(),
                fixed_length: v.fixed_length.unwrap_or(false),
                targets: v.targets.iter().map(|t| (t.packet, t.offset)).collect(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut var_values = VarValues::new();
    for (&var_idx, raw) in spec.var_values.iter().flatten() {
        if var_idx >= variables.len() {
            return Err(Error::Config(format!(
                "flow {flow_idx}: value given for unknown variable {var_idx}"
            )));
        }
        var_values.insert(var_idx, hex::decode(raw)?);
    }

    let min_pkt_delay_ms = spec.min_pkt_delay_ms.or(defaults.min_pkt_delay_ms);
    let max_pkt_delay_ms = spec.max_pkt_delay_ms.or(defaults.max_pkt_delay_ms);
    if let (Some(min), Some(max)) = (min_pkt_delay_ms, max_pkt_delay_ms) {
        if min > max {
            return Err(Error::Config(format!(
                "flow {flow_idx}: min_pkt_delay_ms {min} exceeds max_pkt_delay_ms {max}"
            )));
        }
    }
    let timing = FlowTiming {
        min_pkt_delay_ms,
        max_pkt_delay_ms,
        inactivity_timeout_ms: spec
            .inactivity_timeout_ms
            .or(defaults.inactivity_timeout_ms)
            .unwrap_or(DEFAULT_INACTIVITY_TIMEOUT_MS),
        wait_timeout_ms: spec
            .wait_timeout_ms
            .or(spec.min_pkt_delay_ms)
            .or(defaults.wait_timeout_ms)
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
    };

    let layer = spec.layer.or(defaults.layer).unwrap_or_default();
    let config = FlowConfig::new(layer, play_type, packets, variables)?;
    debug!(
        flow_idx,
        ?layer,
        packets = config.packets.len(),
        variables = config.variables.len(),
        "流配置构建完成"
    );

    Ok(FlowEntry {
        config: Arc::new(config),
        timing,
        var_values,
        start_ms: spec.start_ms.unwrap_or(0),
    })
}

/// 先插入本流全部修饰器，再建立联动（被联动的一方必须已存在）。
fn add_modifiers(
    block: &mut ModifierBlock,
    flow_idx: usize,
    specs: &[ModifierSpec],
    variables: &[Variable],
) -> Result<()> {
    let wrap = move |var_idx: usize| move |source: ModifierError| Error::InvalidModifier {
        flow_idx,
        var_idx,
        source,
    };

    for spec in specs {
        if spec.var >= variables.len() {
            return Err(Error::Config(format!(
                "flow {flow_idx}: modifier targets unknown variable {}",
                spec.var
            )));
        }
        let modifier = match &spec.kind {
            ModifierKindSpec::Range {
                start,
                step,
                mask,
                recycle,
                stutter,
                mode,
            } => Modifier::Range(
                RangeModifier::new(
                    &hex::decode(start)?,
                    &hex::decode(step)?,
                    &hex::decode(mask)?,
                    *recycle,
                    stutter.unwrap_or(0),
                    *mode,
                )
                .map_err(wrap(spec.var))?,
            ),
            ModifierKindSpec::Table { rows, stutter } => {
                let rows = rows
                    .iter()
                    .map(hex::decode)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Modifier::Table(TableModifier::new(rows, stutter.unwrap_or(0)))
            }
        };
        block
            .insert(flow_idx, spec.var, modifier)
            .map_err(wrap(spec.var))?;
    }

    for spec in specs {
        if let Some(driver) = spec.link {
            block
                .link(flow_idx, spec.var, driver)
                .map_err(wrap(spec.var))?;
        }
    }
    Ok(())
}

/// 流级循环：区间必须落在流范围内且两两不相交。
fn build_loops(spec: &PlaylistSpec, flow_count: usize) -> Result<Vec<LoopRange>> {
    let mut loops: Vec<LoopRange> = spec
        .loops
        .iter()
        .map(|l| LoopRange {
            begin: l.begin,
            end: l.end,
            count: l.count,
        })
        .collect();

    for l in &loops {
        if l.begin > l.end || l.end >= flow_count {
            return Err(Error::InvalidLoop(format!(
                "flow loop [{}, {}] is outside the {flow_count} configured flows",
                l.begin, l.end
            )));
        }
        if l.count == 0 {
            return Err(Error::InvalidLoop(format!(
                "flow loop [{}, {}] has a zero count",
                l.begin, l.end
            )));
        }
    }

    loops.sort_by_key(|l| l.begin);
    for pair in loops.windows(2) {
        if pair[1].begin <= pair[0].end {
            return Err(Error::InvalidLoop(format!(
                "flow loops [{}, {}] and [{}, {}] overlap",
                pair[0].begin, pair[0].end, pair[1].begin, pair[1].end
            )));
        }
    }
    Ok(loops)
}
