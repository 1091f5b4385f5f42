//! Benchmarks the ExtTSP chain builder (C5) and C³ clustering (C6) on a
//! synthetic chain of small hot functions, each calling the next.

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use propeller::address_mapper::{AddressMapper, AddressMapperInput, FunctionInfo};
use propeller::cfg_builder::{build as build_cfgs, CfgBuilderInput};
use propeller::chain_builder;
use propeller::clustering::{self, MostLikelyPredecessor};
use propeller::config::PropellerOptions;
use propeller::core::bb_addr_map::{BbAddrMapEntry, BbEntry, BbMetadata, BbRange};
use propeller::core::chain::ChainId;
use propeller::profile::aggregator::BranchAggregation;
use propeller::stats::PropellerStats;

const FUNCTION_COUNT: usize = 64;
const BLOCKS_PER_FUNCTION: u64 = 6;
const BLOCK_SIZE: u64 = 16;

fn synthetic_program() -> (AddressMapper, propeller::cfg_builder::ProgramCfgs, PropellerOptions) {
    let mut maps = Vec::with_capacity(FUNCTION_COUNT);
    let mut info = Vec::with_capacity(FUNCTION_COUNT);
    let mut sizes = HashMap::new();
    let mut sections = HashMap::new();
    let mut aggregation = BranchAggregation::default();

    let function_span = BLOCKS_PER_FUNCTION * BLOCK_SIZE + 0x100;
    for i in 0..FUNCTION_COUNT {
        let base = 0x1000 + i as u64 * function_span;
        let entries: Vec<BbEntry> = (0..BLOCKS_PER_FUNCTION)
            .map(|b| BbEntry {
                id: b as u32,
                offset: b * BLOCK_SIZE,
                size: BLOCK_SIZE,
                metadata: BbMetadata::CAN_FALL_THROUGH,
            })
            .collect();
        maps.push(BbAddrMapEntry {
            function_address: base,
            ranges: vec![BbRange { base_address: base, entries }],
        });
        info.push(FunctionInfo {
            aliases: vec![format!("fn_{i}")],
            section_name: ".text".to_string(),
        });
        sizes.insert(i, BLOCKS_PER_FUNCTION * BLOCK_SIZE);
        sections.insert(i, 1);

        // Every block branches forward within the function (hot chain).
        for b in 0..BLOCKS_PER_FUNCTION.saturating_sub(1) {
            let from = base + b * BLOCK_SIZE;
            let to = base + (b + 1) * BLOCK_SIZE;
            aggregation.branch_counters.insert((from, to), 100);
        }
        // Tail-calls into the next function, chaining them together.
        if i + 1 < FUNCTION_COUNT {
            let from = base + (BLOCKS_PER_FUNCTION - 1) * BLOCK_SIZE;
            let next_base = 0x1000 + (i + 1) as u64 * function_span;
            aggregation.branch_counters.insert((from, next_base), 50);
        }
    }

    let mut stats = PropellerStats::default();
    let mapper = AddressMapper::build(
        AddressMapperInput {
            maps: &maps,
            function_info: &info,
            hot_addresses: None,
            require_text_section: false,
        },
        &mut stats,
    );
    let programs = build_cfgs(
        CfgBuilderInput {
            mapper: &mapper,
            function_sizes: &sizes,
            function_sections: &sections,
            relocations_by_object: &[],
            aggregation: &aggregation,
        },
        &mut stats,
    );
    (mapper, programs, PropellerOptions::default())
}

fn bench_chain_builder(c: &mut Criterion) {
    let (mapper, programs, opts) = synthetic_program();
    c.bench_function("chain_builder::build 64 functions x 6 blocks", |b| {
        b.iter_batched(
            || (),
            |_| chain_builder::build(&programs, &mapper, &opts),
            BatchSize::LargeInput,
        )
    });
}

fn bench_clustering(c: &mut Criterion) {
    let (mapper, programs, opts) = synthetic_program();
    let chains = chain_builder::build(&programs, &mapper, &opts);
    let predecessors: HashMap<ChainId, MostLikelyPredecessor> = HashMap::new();
    c.bench_function("clustering::cluster 64 chains", |b| {
        b.iter(|| clustering::cluster(&chains, &predecessors, &opts))
    });
}

criterion_group!(benches, bench_chain_builder, bench_clustering);
criterion_main!(benches);
