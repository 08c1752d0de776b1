use crate::errors::PlannerError;
use crate::graph::qsu_graph::QsuGraph;
use crate::logical_plan::logical_plan::LogicalPlan;
use crate::pipeline::errors::{Pass, PipelineError};
use crate::pipeline::pass::{PassResult, RewritePass};
use crate::pipeline::plan_ctx::PlanCtx;
use crate::provenance::provenance::{self as qprov, QAuth};
use crate::qscript::educated::QScriptEducated;

pub mod apply_provenance;
pub mod eliminate_unary;
pub mod errors;
pub mod expand_shifts;
pub mod extract_free_map;
pub mod graduate;
pub mod minimize_auto_joins;
pub mod pass;
pub mod plan_ctx;
pub mod read_lp;
pub mod recognize_distinct;
pub mod reify_auto_joins;
pub mod reify_buckets;
pub mod reify_identities;
pub mod resolve_own_identities;
pub mod rewrite_group_by_arrays;

/// Graph plus the authentication map, passed between the provenance-aware
/// passes.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedQsu {
    pub graph: QsuGraph,
    pub auth: QAuth,
}

/// Authenticated graph with all identity bookkeeping resolved, ready for
/// graduation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchedQsu {
    pub graph: QsuGraph,
    pub auth: QAuth,
}

/// Compiles a logical plan into the published algebra by running every pass
/// in order. The first error aborts the pipeline; there is no partial
/// result.
pub fn lp_to_qscript(
    lp: &LogicalPlan,
    ctx: &mut PlanCtx,
) -> Result<QScriptEducated, PlannerError> {
    let graph = read_lp::ReadLp::new().build_graph(lp, ctx)?;
    debug_graph(Pass::ReadLp, &graph);

    let graph = run(
        &rewrite_group_by_arrays::RewriteGroupByArrays::new(),
        graph,
        ctx,
    )?;
    let graph = run(&eliminate_unary::EliminateUnary::new(), graph, ctx)?;
    let graph = run(&recognize_distinct::RecognizeDistinct::new(), graph, ctx)?;
    let graph = run(&extract_free_map::ExtractFreeMap::new(), graph, ctx)?;

    let authed = apply_provenance::ApplyProvenance::new().apply(graph, ctx)?;
    debug_graph(Pass::ApplyProvenance, &authed.graph);

    let authed = run_authenticated(&reify_buckets::ReifyBuckets::new(), authed, ctx)?;
    let authed = run_authenticated(&minimize_auto_joins::MinimizeAutoJoins::new(), authed, ctx)?;
    let authed = run_authenticated(&reify_auto_joins::ReifyAutoJoins::new(), authed, ctx)?;
    let authed = run_authenticated(&expand_shifts::ExpandShifts::new(), authed, ctx)?;
    let authed = run_authenticated(
        &resolve_own_identities::ResolveOwnIdentities::new(),
        authed,
        ctx,
    )?;

    let researched = reify_identities::ReifyIdentities::new().reify(authed, ctx)?;
    debug_graph(Pass::ReifyIdentities, &researched.graph);

    let educated = graduate::Graduate::new().graduate(&researched)?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "{}: {}",
            Pass::Graduate,
            serde_json::to_string(&educated).unwrap_or_default()
        );
    }
    Ok(educated)
}

fn run(pass: &impl RewritePass, graph: QsuGraph, ctx: &mut PlanCtx) -> PassResult<QsuGraph> {
    let transformed = pass.rewrite(graph, ctx)?;
    let changed = transformed.is_yes();
    let mut graph = transformed.get_plan();
    if changed {
        graph
            .prune_unreachable()
            .map_err(|source| PipelineError::Graph {
                pass: pass.pass(),
                source,
            })?;
        graph.validate().map_err(|source| PipelineError::Graph {
            pass: pass.pass(),
            source,
        })?;
    }
    debug_graph(pass.pass(), &graph);
    Ok(graph)
}

fn run_authenticated(
    pass: &impl RewritePass,
    qsu: AuthenticatedQsu,
    ctx: &mut PlanCtx,
) -> PassResult<AuthenticatedQsu> {
    let transformed = pass.rewrite_authenticated(qsu, ctx)?;
    let changed = transformed.is_yes();
    let mut qsu = transformed.get_plan();
    if changed {
        qsu.graph
            .prune_unreachable()
            .map_err(|source| PipelineError::Graph {
                pass: pass.pass(),
                source,
            })?;
        qsu.graph.validate().map_err(|source| PipelineError::Graph {
            pass: pass.pass(),
            source,
        })?;
        // a structural rewrite may have re-shaped nodes above the rewritten
        // ones; re-derive provenance for the whole graph
        qprov::compute(&qsu.graph, &mut qsu.auth).map_err(|source| {
            PipelineError::Provenance {
                pass: pass.pass(),
                source,
            }
        })?;
    }
    qsu.auth
        .verify_covers(&qsu.graph)
        .map_err(|source| PipelineError::Provenance {
            pass: pass.pass(),
            source,
        })?;
    debug_graph(pass.pass(), &qsu.graph);
    Ok(qsu)
}

fn debug_graph(pass: Pass, graph: &QsuGraph) {
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("{}:\n{}", pass, graph);
    }
}
