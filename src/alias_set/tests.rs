use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
};

use proptest::prelude::*;

use super::*;
use crate::{
    ir::{parse_module, FnId},
    program::AliasResult,
};

/// Oracle answering from a fixed table; unlisted pairs are `NoAlias`.
struct TableOracle {
    verdicts: HashMap<(ValueRef, ValueRef), AliasResult>,
    queries: RefCell<Vec<(ValueRef, ValueRef)>>,
}

impl TableOracle {
    fn new(module: &Module, table: &[(&str, &str, &str, AliasResult)]) -> Self {
        let verdicts = table
            .iter()
            .map(|(f, a, b, r)| ((value(module, f, a), value(module, f, b)), *r))
            .collect();
        Self {
            verdicts,
            queries: RefCell::new(vec![]),
        }
    }

    fn queried(&self) -> Vec<(ValueRef, ValueRef)> {
        self.queries.borrow().clone()
    }
}

impl AliasOracle<ValueRef> for TableOracle {
    fn alias(&self, a: ValueRef, b: ValueRef) -> AliasResult {
        self.queries.borrow_mut().push((a, b));
        self.verdicts
            .get(&(a, b))
            .or_else(|| self.verdicts.get(&(b, a)))
            .copied()
            .unwrap_or(AliasResult::NoAlias)
    }
}

fn parse(code: &str) -> Module {
    parse_module(code).unwrap()
}

fn func(module: &Module, name: &str) -> FnId {
    module.find_function(name).unwrap()
}

fn value(module: &Module, f: &str, name: &str) -> ValueRef {
    module.find_value(func(module, f), name).unwrap()
}

fn names(module: &Module, partition: &Partition<ValueRef>) -> Vec<Vec<String>> {
    partition
        .iter()
        .map(|set| set.iter().map(|e| module.qualified_name(e)).collect())
        .collect()
}

fn run_table(
    code: &str,
    table: &[(&str, &str, &str, AliasResult)],
    conf: Config,
) -> (Module, AnalysisResults<ValueRef>, Vec<(ValueRef, ValueRef)>) {
    let module = parse(code);
    let oracle = TableOracle::new(&module, table);
    let res = AliasSetBuilder::new(&module, &oracle, conf).build();
    let queried = oracle.queried();
    (module, res, queried)
}

fn analyze_code<F>(code: &str, conf: Config, f: F)
where F: FnOnce(&Module, AnalysisResults<ValueRef>) {
    let module = parse(code);
    let res = analyze(&module, &conf);
    f(&module, res);
}

const FOUR_PARAMS: &str = "
fn f(%p0: ptr, %p1: ptr, %p2: ptr, %p3: ptr) {
  ret
}
";

#[test]
fn test_may_and_must_alias_merge() {
    let (module, res, queried) = run_table(
        FOUR_PARAMS,
        &[
            ("f", "p0", "p2", AliasResult::MayAlias),
            ("f", "p2", "p3", AliasResult::MustAlias),
        ],
        Config::default(),
    );
    assert_eq!(
        names(&module, &res.partition),
        vec![vec!["f.p0", "f.p2", "f.p3"], vec!["f.p1"]]
    );
    assert_eq!(queried.len(), 6);
    assert_eq!(res.stats.queries, 6);
    assert_eq!(res.stats.aliasing_pairs, 2);
    assert_eq!(res.stats.sets, 2);
}

#[test]
fn test_each_pair_queried_once() {
    let (_, _, queried) = run_table(FOUR_PARAMS, &[], Config::default());
    let unordered: HashSet<_> = queried
        .iter()
        .map(|(a, b)| if a < b { (*a, *b) } else { (*b, *a) })
        .collect();
    assert_eq!(unordered.len(), queried.len());
    assert!(queried.iter().all(|(a, b)| a != b));
}

#[test]
fn test_no_alias_singletons() {
    let (module, res, queried) = run_table(
        "
        fn f(%a: ptr, %b: ptr) {
          ret
        }
        fn g(%c: ptr) {
          %d = alloca
          ret
        }
        ",
        &[],
        Config::default(),
    );
    assert_eq!(
        names(&module, &res.partition),
        vec![vec!["f.a"], vec!["f.b"], vec!["g.c"], vec!["g.d"]]
    );
    assert_eq!(queried.len(), 2);
}

#[test]
fn test_function_without_pointers() {
    let (module, res, queried) = run_table(
        "
        fn f(%n: int) -> int {
          %m = add %n, 1
          ret %m
        }
        fn g(%a: ptr, %b: ptr) {
          ret
        }
        ",
        &[],
        Config::default(),
    );
    let f = func(&module, "f");
    assert!(queried.iter().all(|(a, b)| {
        !matches!(a, ValueRef::Param(g, _) | ValueRef::Inst(g, _) if *g == f)
            && !matches!(b, ValueRef::Param(g, _) | ValueRef::Inst(g, _) if *g == f)
    }));
    assert_eq!(queried.len(), 1);
    assert_eq!(res.partition.num_entities(), 2);
    assert_eq!(res.partition.try_set_id_of(value(&module, "f", "n")), None);
    assert_eq!(res.stats.functions, 2);
}

#[test]
fn test_single_pointer_no_query() {
    let (_, res, queried) = run_table(
        "
        fn f(%a: ptr, %n: int) {
          ret
        }
        ",
        &[],
        Config::default(),
    );
    assert!(queried.is_empty());
    assert_eq!(res.partition.num_sets(), 1);
}

#[test]
fn test_empty_program() {
    let (_, res, queried) = run_table("", &[], Config::default());
    assert!(queried.is_empty());
    assert!(res.partition.is_empty());
    assert_eq!(res.partition.num_sets(), 0);
    assert_eq!(res.partition.num_entities(), 0);
}

#[test]
#[should_panic(expected = "is not in any alias set")]
fn test_set_id_of_unregistered() {
    let (module, res, _) = run_table(
        "
        fn f(%a: ptr, %n: int) {
          ret
        }
        ",
        &[],
        Config::default(),
    );
    res.partition.set_id_of(value(&module, "f", "n"));
}

#[test]
#[should_panic(expected = "was never registered")]
fn test_union_unregistered() {
    let module = parse(
        "
        fn f(%a: ptr, %n: int) {
          ret
        }
        ",
    );
    let oracle = TableOracle::new(&module, &[]);
    let mut builder = AliasSetBuilder::new(&module, &oracle, Config::default());
    builder.discover();
    builder.union(value(&module, "f", "a"), value(&module, "f", "n"));
}

#[test]
#[should_panic(expected = "does not exist")]
fn test_set_at_out_of_range() {
    let (_, res, _) = run_table(FOUR_PARAMS, &[], Config::default());
    res.partition.set_at(4);
}

#[test]
fn test_transitive_across_unqueried_pair() {
    let (module, res, _) = run_table(
        "
        fn f(%a: ptr, %b: ptr, %c: ptr, %d: ptr) {
          ret
        }
        ",
        &[
            ("f", "a", "b", AliasResult::PartialAlias),
            ("f", "b", "c", AliasResult::MayAlias),
        ],
        Config::default(),
    );
    let p = &res.partition;
    let (a, c, d) = (
        value(&module, "f", "a"),
        value(&module, "f", "c"),
        value(&module, "f", "d"),
    );
    assert!(p.same_set(a, c));
    assert!(!p.same_set(a, d));
    assert_eq!(p.set_of(c).len(), 3);
    assert!(p.set_of(d).contains(d));
}

#[test]
fn test_registration_order() {
    let (module, res, _) = run_table(
        "
        fn f(%n: int, %a: ptr) {
          %x = alloca
          %y = load int %x
          %z = gep %x, 4
          ret
        }
        fn g(%b: ptr) {
          ret
        }
        ",
        &[("f", "a", "z", AliasResult::MayAlias)],
        Config::default(),
    );
    assert_eq!(
        names(&module, &res.partition),
        vec![vec!["f.a", "f.z"], vec!["f.x"], vec!["g.b"]]
    );
    let z = value(&module, "f", "z");
    assert_eq!(res.partition.set_id_of(z), 0);
}

#[test]
fn test_diagnostics_do_not_change_result() {
    let table = [
        ("f", "p1", "p3", AliasResult::MustAlias),
        ("f", "p0", "p1", AliasResult::MayAlias),
    ];
    let (module, quiet, _) = run_table(FOUR_PARAMS, &table, Config::default());
    let conf = Config {
        verbose_pairwise: true,
        dump_partition: true,
        interprocedural: false,
    };
    let (_, loud, _) = run_table(FOUR_PARAMS, &table, conf);
    assert_eq!(
        names(&module, &quiet.partition),
        names(&module, &loud.partition)
    );
    assert_eq!(quiet.stats, loud.stats);
}

#[test]
fn test_display() {
    let (module, res, _) = run_table(
        "
        global @g
        fn f(%p0: ptr, %p1: ptr) {
          ret
        }
        ",
        &[],
        Config::default(),
    );
    assert_eq!(
        res.partition.display(&module).to_string(),
        "\nNumber of alias sets: 2\nf.p0 \n\nf.p1 \n\n"
    );
    let g = ValueRef::Global(module.find_global("g").unwrap());
    assert_eq!(module.qualified_name(g), "g");
}

const IDENTITY: &str = "
fn id(%a: ptr) -> ptr {
  ret %a
}
fn main() {
  %x = alloca
  %y = alloca
  %r = call ptr @id(%x)
  call void @id(%y)
  ret
}
";

#[test]
fn test_interprocedural_off() {
    let (module, res, _) = run_table(IDENTITY, &[], Config::default());
    assert_eq!(res.partition.num_sets(), 4);
    assert_eq!(res.stats.interprocedural_pairs, 0);
    assert!(!res
        .partition
        .same_set(value(&module, "id", "a"), value(&module, "main", "x")));
}

#[test]
fn test_interprocedural_matching() {
    let module = parse(IDENTITY);
    let oracle = TableOracle::new(&module, &[]);
    let matcher = ConservativeMatcher;
    let res = AliasSetBuilder::new(&module, &oracle, Config::default())
        .with_matcher(&matcher)
        .build();
    assert_eq!(
        names(&module, &res.partition),
        vec![vec!["id.a", "main.x", "main.y", "main.r"]]
    );
    assert_eq!(res.stats.interprocedural_pairs, 3);
}

#[test]
fn test_interprocedural_flag_selects_conservative_matcher() {
    let conf = Config {
        interprocedural: true,
        ..Config::default()
    };
    let (module, res, _) = run_table(IDENTITY, &[], conf);
    assert_eq!(res.partition.num_sets(), 1);
    assert_eq!(res.stats.interprocedural_pairs, 3);
    assert!(res
        .partition
        .same_set(value(&module, "id", "a"), value(&module, "main", "y")));
}

#[test]
fn test_conservative_matcher_skips_non_pointers() {
    let module = parse(
        "
        fn h(%n: int, %p: ptr, %q: ptr) -> int {
          ret %n
        }
        fn main(%s: ptr) {
          %k = call int @h(3, %s, null)
          ret
        }
        ",
    );
    let h = func(&module, "h");
    let call = module.call_sites(h)[0];
    let pairs = ConservativeMatcher.match_call_site(&module, call, h);
    assert_eq!(
        pairs,
        vec![(value(&module, "main", "s"), value(&module, "h", "p"))]
    );
    let k = value(&module, "main", "k");
    let returned = module.returned_values(h);
    assert!(ConservativeMatcher.match_return(&module, k, &returned).is_empty());
}

#[test]
fn test_basic_oracle_end_to_end() {
    analyze_code(
        "
        fn f(%a: ptr) {
          %x = alloca
          %y = alloca
          %x4 = gep %x, 4
          %h = call ptr @malloc(8)
          ret
        }
        ",
        Config::default(),
        |module, res| {
            assert_eq!(
                names(module, &res.partition),
                vec![vec!["f.a"], vec!["f.x", "f.x4"], vec!["f.y"], vec!["f.h"]]
            );
            assert_eq!(res.stats.aliasing_pairs, 1);
        },
    );
}

#[test]
fn test_max_pointer() {
    let code = "
        fn max_pointer(%a: ptr, %b: ptr) -> ptr {
          %x = load int %a
          %y = load int %b
          %c = icmp %x, %y
          %p = select ptr %c, %a, %b
          ret %p
        }
        fn main() -> int {
          %p0 = call ptr @malloc(4)
          %p1 = call ptr @malloc(4)
          %p2 = call ptr @malloc(4)
          %p3 = call ptr @malloc(4)
          store 0, %p0
          store 1, %p1
          %p4 = call ptr @max_pointer(%p0, %p1)
          %p5 = call ptr @max_pointer(%p2, %p3)
          ret 0
        }
    ";
    analyze_code(code, Config::default(), |module, res| {
        let p = &res.partition;
        assert_eq!(p.num_sets(), 2);
        assert!(p.same_set(
            value(module, "max_pointer", "a"),
            value(module, "max_pointer", "p")
        ));
        assert!(p.same_set(value(module, "main", "p0"), value(module, "main", "p4")));
        assert!(!p.same_set(
            value(module, "max_pointer", "a"),
            value(module, "main", "p0")
        ));
    });
    let conf = Config {
        interprocedural: true,
        ..Config::default()
    };
    analyze_code(code, conf, |module, res| {
        assert_eq!(res.partition.num_sets(), 1);
        assert_eq!(res.stats.interprocedural_pairs, 6);
        assert!(res.partition.same_set(
            value(module, "max_pointer", "b"),
            value(module, "main", "p3")
        ));
    });
}

#[test]
fn test_analyze_str_error() {
    let err = analyze_str("fn f( {", &Config::default()).unwrap_err();
    assert!(matches!(err, ParseError::Unexpected { line: 1, .. }));
}

fn params_fn(n: usize) -> String {
    let params: Vec<_> = (0..n).map(|i| format!("%p{}: ptr", i)).collect();
    format!("fn f({}) {{\n  ret\n}}\n", params.join(", "))
}

fn verdict(n: u8) -> AliasResult {
    match n % 6 {
        0 => AliasResult::MayAlias,
        1 => AliasResult::PartialAlias,
        2 => AliasResult::MustAlias,
        _ => AliasResult::NoAlias,
    }
}

proptest! {
    #[test]
    fn prop_partition_respects_verdicts(
        (n, raw) in (1usize..10)
            .prop_flat_map(|n| (Just(n), prop::collection::vec(any::<u8>(), n * n)))
    ) {
        let module = parse(&params_fn(n));
        let f = func(&module, "f");
        let p = |i: usize| ValueRef::Param(f, i as _);
        let mut verdicts = HashMap::new();
        for i in 0..n {
            for j in i + 1..n {
                verdicts.insert((p(i), p(j)), verdict(raw[i * n + j]));
            }
        }
        let oracle = TableOracle { verdicts: verdicts.clone(), queries: RefCell::new(vec![]) };
        let res = AliasSetBuilder::new(&module, &oracle, Config::default()).build();
        let partition = &res.partition;

        let mut seen = HashSet::new();
        for set in partition {
            prop_assert!(!set.is_empty());
            for e in set.iter() {
                prop_assert!(seen.insert(e));
            }
        }
        prop_assert_eq!(seen.len(), n);

        for ((a, b), r) in &verdicts {
            if r.may_alias() {
                prop_assert!(partition.same_set(*a, *b));
            }
        }

        // Connected components of the positive pairs, by label propagation.
        let mut label: Vec<_> = (0..n).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..n {
                for j in i + 1..n {
                    if verdicts[&(p(i), p(j))].may_alias() && label[i] != label[j] {
                        let min = label[i].min(label[j]);
                        label[i] = min;
                        label[j] = min;
                        changed = true;
                    }
                }
            }
        }
        for i in 0..n {
            for j in 0..n {
                prop_assert_eq!(partition.same_set(p(i), p(j)), label[i] == label[j]);
            }
        }
    }

    #[test]
    fn prop_union_order_independent(
        (n, pairs) in (1usize..12)
            .prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..20)))
    ) {
        let module = parse(&params_fn(n));
        let f = func(&module, "f");
        let p = |i: usize| ValueRef::Param(f, i as _);
        let oracle = TableOracle { verdicts: HashMap::new(), queries: RefCell::new(vec![]) };
        let partition_of = |pairs: &[(usize, usize)]| {
            let mut builder = AliasSetBuilder::new(&module, &oracle, Config::default());
            builder.discover();
            for (a, b) in pairs {
                builder.union(p(*a), p(*b));
            }
            names(&module, &builder.finish().partition)
        };
        let mut reversed = pairs.clone();
        reversed.reverse();
        let doubled: Vec<_> = pairs.iter().chain(pairs.iter()).cloned().collect();
        let expected = partition_of(&pairs[..]);
        prop_assert_eq!(&expected, &partition_of(&reversed[..]));
        prop_assert_eq!(&expected, &partition_of(&doubled[..]));
    }
}
