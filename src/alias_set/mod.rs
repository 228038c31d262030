mod matcher;
mod partition;

use std::path::Path;

pub use matcher::{CallMatcher, ConservativeMatcher};
pub use partition::{AliasSet, Partition, PartitionDisplay};

use crate::{
    disjoint_set::EquivalenceForest,
    ir::{self, BasicOracle, LoadError, Module, ParseError, ValueRef},
    program::{AliasOracle, Program},
    registry::EntityRegistry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub verbose_pairwise: bool,
    pub dump_partition: bool,
    pub interprocedural: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub functions: usize,
    pub entities: usize,
    pub queries: usize,
    pub aliasing_pairs: usize,
    pub interprocedural_pairs: usize,
    pub sets: usize,
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "functions: {}, pointers: {}, queries: {}, aliasing pairs: {}, \
             interprocedural pairs: {}, alias sets: {}",
            self.functions,
            self.entities,
            self.queries,
            self.aliasing_pairs,
            self.interprocedural_pairs,
            self.sets
        )
    }
}

#[derive(Debug)]
pub struct AnalysisResults<E> {
    pub partition: Partition<E>,
    pub stats: Stats,
}

pub fn analyze_path(
    path: &Path,
    conf: &Config,
) -> Result<AnalysisResults<ValueRef>, LoadError> {
    let module = ir::load_module(path)?;
    Ok(analyze(&module, conf))
}

pub fn analyze_str(
    code: &str,
    conf: &Config,
) -> Result<AnalysisResults<ValueRef>, ParseError> {
    let module = ir::parse_module(code)?;
    Ok(analyze(&module, conf))
}

pub fn analyze(module: &Module, conf: &Config) -> AnalysisResults<ValueRef> {
    let oracle = BasicOracle::new(module);
    AliasSetBuilder::new(module, oracle, *conf).build()
}

pub struct AliasSetBuilder<'a, P: Program, O> {
    program: &'a P,
    oracle: O,
    config: Config,
    matcher: Option<&'a dyn CallMatcher<P>>,
    registry: EntityRegistry<P::Entity>,
    forest: EquivalenceForest,
    stats: Stats,
}

impl<'a, P: Program, O: AliasOracle<P::Entity>> AliasSetBuilder<'a, P, O> {
    pub fn new(program: &'a P, oracle: O, config: Config) -> Self {
        Self {
            program,
            oracle,
            config,
            matcher: None,
            registry: EntityRegistry::new(),
            forest: EquivalenceForest::new(0),
            stats: Stats::default(),
        }
    }

    /// Runs regardless of `Config::interprocedural`, which otherwise selects
    /// [`ConservativeMatcher`].
    pub fn with_matcher(mut self, matcher: &'a dyn CallMatcher<P>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn build(mut self) -> AnalysisResults<P::Entity> {
        self.discover();
        self.run_intraprocedural();
        let matcher = match self.matcher {
            Some(matcher) => Some(matcher),
            None if self.config.interprocedural => {
                Some(&ConservativeMatcher as &dyn CallMatcher<P>)
            }
            None => None,
        };
        if let Some(matcher) = matcher {
            self.run_interprocedural(matcher);
        }
        self.finish()
    }

    pub fn register(&mut self, e: P::Entity) -> usize {
        let id = self.registry.register(e);
        self.forest.grow(self.registry.len());
        id
    }

    #[inline]
    pub fn lookup(&self, e: P::Entity) -> Option<usize> {
        self.registry.lookup(e)
    }

    pub fn union(&mut self, a: P::Entity, b: P::Entity) -> bool {
        let id1 = self.expect_registered(a);
        let id2 = self.expect_registered(b);
        self.forest.union(id1, id2)
    }

    /// Parameters before instructions, function by function.
    pub fn discover(&mut self) {
        for f in self.program.functions() {
            for e in self.program.pointer_values(f) {
                self.register(e);
            }
        }
        tracing::info!("registered {} pointer values", self.registry.len());
    }

    pub fn run_intraprocedural(&mut self) {
        for f in self.program.functions() {
            self.stats.functions += 1;
            let pointers = self.program.pointer_values(f);
            for (i, p) in pointers.iter().enumerate() {
                for q in &pointers[i + 1..] {
                    self.query(*p, *q);
                }
            }
        }
        tracing::info!(
            "{} queries, {} aliasing pairs",
            self.stats.queries,
            self.stats.aliasing_pairs
        );
    }

    fn query(&mut self, p: P::Entity, q: P::Entity) {
        self.expect_registered(p);
        self.expect_registered(q);
        self.stats.queries += 1;
        let result = self.oracle.alias(p, q);
        if !result.may_alias() {
            return;
        }
        self.stats.aliasing_pairs += 1;
        self.union(p, q);
        tracing::debug!("{:?} ~ {:?}: {:?}", p, q, result);
        if self.config.verbose_pairwise {
            let (_, p_name) = self.program.name_of(p);
            let (_, q_name) = self.program.name_of(q);
            eprintln!("{} is alias of {}; {}", p_name, q_name, result);
        }
    }

    pub fn run_interprocedural(&mut self, matcher: &dyn CallMatcher<P>) {
        for callee in self.program.functions() {
            let returned = self.program.returned_values(callee);
            for call in self.program.call_sites(callee) {
                let mut pairs = matcher.match_call_site(self.program, call, callee);
                if let Some(result) = self.program.call_result(call) {
                    pairs.extend(matcher.match_return(self.program, result, &returned));
                }
                for (a, b) in pairs {
                    tracing::debug!("{:?} at {:?}: {:?} ~ {:?}", callee, call, a, b);
                    self.stats.interprocedural_pairs += 1;
                    self.union(a, b);
                }
            }
        }
        tracing::info!("{} interprocedural pairs", self.stats.interprocedural_pairs);
    }

    pub fn finish(self) -> AnalysisResults<P::Entity> {
        let Self {
            program,
            config,
            registry,
            forest,
            mut stats,
            ..
        } = self;
        let classes = forest.finalize();
        let partition = Partition::new(registry, &classes);
        stats.entities = partition.num_entities();
        stats.sets = partition.num_sets();
        tracing::info!(
            "{} pointer values in {} alias sets",
            stats.entities,
            stats.sets
        );
        if config.dump_partition {
            eprint!("{}", partition.display(program));
        }
        AnalysisResults { partition, stats }
    }

    fn expect_registered(&self, e: P::Entity) -> usize {
        match self.registry.lookup(e) {
            Some(id) => id,
            None => panic!("{:?} was never registered", e),
        }
    }
}

#[cfg(test)]
mod tests;
