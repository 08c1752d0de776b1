use qscript::errors::PlannerError;
use qscript::logical_plan::plan_builder;
use qscript::pipeline::errors::PipelineError;
use qscript::pipeline::plan_ctx::PlanCtx;
use qscript::pipeline::lp_to_qscript;
use qscript::qscript::dsl;
use qscript::qscript::educated::{Educated, QScriptEducated};
use qscript::qscript::mapfunc::{Literal, MapFunc};
use qscript::qscript::types::{
    Hole, IdStatus, JoinSide, ReduceIndex, Reducer, Rotation, SortDir,
};

fn compile(lp: &std::sync::Arc<qscript::logical_plan::logical_plan::LogicalPlan>) -> QScriptEducated {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ctx = PlanCtx::new();
    lp_to_qscript(lp, &mut ctx).unwrap()
}

#[test]
fn test_single_column_selection_smoke() {
    // SELECT city FROM zips
    let lp = plan_builder::map(
        plan_builder::read(&["db", "zips"]),
        dsl::project_key_s(MapFunc::Free(Hole), "city"),
    );
    let educated = compile(&lp);

    assert_eq!(educated.count_variant("ShiftedRead"), 1);
    assert_eq!(educated.count_variant("Map"), 1);
    match &educated.0 {
        Educated::Map(map) => {
            assert_eq!(map.func, dsl::project_key_s(MapFunc::Free(Hole), "city"));
            assert!(matches!(map.src.0, Educated::ShiftedRead(_)));
        }
        other => panic!("Expected Map over ShiftedRead, got {:?}", other),
    }
}

#[test]
fn test_incompatible_shifts_expand_without_guards() {
    // combine an array unnest and a map unnest of the same rows
    let lp = plan_builder::let_bound(
        "rows",
        plan_builder::read(&["db", "zips"]),
        plan_builder::combine(
            plan_builder::shift(
                plan_builder::free("rows"),
                dsl::project_key_s(MapFunc::Free(Hole), "tags"),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
            ),
            plan_builder::shift(
                plan_builder::free("rows"),
                dsl::project_key_s(MapFunc::Free(Hole), "attrs"),
                IdStatus::ExcludeId,
                Rotation::ShiftMap,
            ),
            dsl::concat_maps(
                dsl::make_map_s("tag", MapFunc::Free(JoinSide::LeftSide)),
                dsl::make_map_s("attr", MapFunc::Free(JoinSide::RightSide)),
            ),
        ),
    );
    let educated = compile(&lp);

    // the multi shift was lowered into a chain of two single shifts over
    // one read, with a projection on top
    assert_eq!(educated.count_variant("ShiftedRead"), 1);
    assert_eq!(educated.count_variant("LeftShift"), 2);
    assert_eq!(educated.count_variant("ThetaJoin"), 0);
    assert_eq!(educated.count_variant("EquiJoin"), 0);
    match &educated.0 {
        Educated::Map(map) => match &map.src.0 {
            Educated::LeftShift(second) => {
                // incompatible rotations: the repair is the raw scaffold
                assert!(!matches!(second.repair, MapFunc::Cond(_, _, _)));
            }
            other => panic!("Expected LeftShift chain, got {:?}", other),
        },
        other => panic!("Expected projection Map, got {:?}", other),
    }
}

#[test]
fn test_compatible_shifts_expand_with_reified_guard() {
    // two array unnests of the same rows: the second shift must guard on
    // the first one's identity, which in turn must be materialized
    let lp = plan_builder::let_bound(
        "rows",
        plan_builder::read(&["db", "zips"]),
        plan_builder::combine(
            plan_builder::shift(
                plan_builder::free("rows"),
                dsl::project_key_s(MapFunc::Free(Hole), "tags"),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
            ),
            plan_builder::shift(
                plan_builder::free("rows"),
                dsl::project_key_s(MapFunc::Free(Hole), "labels"),
                IdStatus::ExcludeId,
                Rotation::ShiftArray,
            ),
            dsl::concat_maps(
                dsl::make_map_s("tag", MapFunc::Free(JoinSide::LeftSide)),
                dsl::make_map_s("label", MapFunc::Free(JoinSide::RightSide)),
            ),
        ),
    );
    let educated = compile(&lp);

    assert_eq!(educated.count_variant("ShiftedRead"), 1);
    assert_eq!(educated.count_variant("LeftShift"), 2);
    match &educated.0 {
        Educated::Map(map) => match &map.src.0 {
            Educated::LeftShift(second) => {
                // the guard survived all the way through graduation
                match &second.repair {
                    MapFunc::Cond(_, _, otherwise) => {
                        assert_eq!(**otherwise, MapFunc::Undefined)
                    }
                    other => panic!("Expected guarded repair, got {:?}", other),
                }
                // guarding forced the identity onto the shifted output
                assert_eq!(second.id_status, IdStatus::IncludeId);
            }
            other => panic!("Expected LeftShift chain, got {:?}", other),
        },
        other => panic!("Expected projection Map, got {:?}", other),
    }
}

#[test]
fn test_whole_row_distinct_lowers_to_canonical_reduce() {
    let lp = plan_builder::group_by(
        plan_builder::read(&["db", "zips"]),
        vec![MapFunc::Free(Hole)],
        vec![(Reducer::Arbitrary, MapFunc::Free(Hole))],
        MapFunc::Free(ReduceIndex(0)),
    );
    let educated = compile(&lp);

    match &educated.0 {
        Educated::Reduce(reduce) => {
            assert_eq!(reduce.buckets, vec![MapFunc::Free(Hole)]);
            assert_eq!(reduce.reducers.len(), 1);
            assert_eq!(reduce.reducers[0].reducer, Reducer::Arbitrary);
        }
        other => panic!("Expected canonical Reduce, got {:?}", other),
    }
}

#[test]
fn test_union_of_projections_shares_the_read() {
    let lp = plan_builder::let_bound(
        "rows",
        plan_builder::read(&["db", "zips"]),
        plan_builder::union(
            plan_builder::map(
                plan_builder::free("rows"),
                dsl::project_key_s(MapFunc::Free(Hole), "city"),
            ),
            plan_builder::map(
                plan_builder::free("rows"),
                dsl::project_key_s(MapFunc::Free(Hole), "state"),
            ),
        ),
    );
    let educated = compile(&lp);

    assert_eq!(educated.count_variant("Union"), 1);
    // the shared read appears once, as the union's source
    assert_eq!(educated.count_variant("ShiftedRead"), 1);
    match &educated.0 {
        Educated::Union(union) => {
            assert!(matches!(union.src.0, Educated::ShiftedRead(_)));
        }
        other => panic!("Expected Union, got {:?}", other),
    }
}

#[test]
fn test_filter_sort_subset_pipeline() {
    let lp = plan_builder::subset(
        plan_builder::sort(
            plan_builder::filter(
                plan_builder::read(&["db", "zips"]),
                dsl::eq(
                    dsl::project_key_s(MapFunc::Free(Hole), "state"),
                    MapFunc::Constant(Literal::String("MA".to_string())),
                ),
            ),
            vec![(
                dsl::project_key_s(MapFunc::Free(Hole), "pop"),
                SortDir::Desc,
            )],
        ),
        qscript::qscript::types::SubsetOp::Take,
        10,
    );
    let educated = compile(&lp);

    assert_eq!(educated.count_variant("Subset"), 1);
    assert_eq!(educated.count_variant("Sort"), 1);
    assert_eq!(educated.count_variant("Filter"), 1);
    assert_eq!(educated.count_variant("ShiftedRead"), 1);
}

#[test]
fn test_unbound_variable_aborts_the_pipeline() {
    let lp = plan_builder::free("ghost");
    let mut ctx = PlanCtx::new();
    match lp_to_qscript(&lp, &mut ctx) {
        Err(PlannerError::Pipeline(PipelineError::UnboundVariable { name })) => {
            assert_eq!(name, "ghost")
        }
        other => panic!("Expected UnboundVariable, got {:?}", other),
    }
}

#[test]
fn test_root_read_has_no_file_path() {
    let lp = plan_builder::read(&[]);
    let mut ctx = PlanCtx::new();
    match lp_to_qscript(&lp, &mut ctx) {
        Err(PlannerError::Pipeline(PipelineError::NoFilePathFound { .. })) => {}
        other => panic!("Expected NoFilePathFound, got {:?}", other),
    }
}

#[test]
fn test_published_plan_serializes() {
    let lp = plan_builder::map(
        plan_builder::read(&["db", "zips"]),
        dsl::project_key_s(MapFunc::Free(Hole), "city"),
    );
    let educated = compile(&lp);
    let rendered = serde_json::to_string(&educated).unwrap();
    assert!(rendered.contains("ShiftedRead"));
    assert!(rendered.contains("city"));
}
