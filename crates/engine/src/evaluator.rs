use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use nexus_cache::{
    CacheStack, FinalKey, LeopardKey, SubjectRelationObjectKey, SubproblemFamily, TigerKey, TigerProbe, VisibilityKey,
};
use nexus_interner::Interner;
use nexus_models::{
    CheckRequest, Consistency, Decision, NexusError, ObjectRef, Principal, Rule, Schema, TraceStep, TupleFilter,
    TypeDefinition,
};
use nexus_schema::SchemaRegistry;
use nexus_store::{StoreError, TupleStore};

use crate::config::EvaluatorConfig;
use crate::error::{EngineError, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a single check needs that doesn't change during its
/// recursion — cheap to clone (every field is an `Arc` or small owned
/// value), so it's moved whole into the evaluation future rather than
/// borrowed, keeping that future `'static` for the Final Cache's
/// single-flight dedup.
#[derive(Clone)]
struct Env {
    tenant: String,
    store: Arc<dyn TupleStore>,
    schema: Arc<Schema>,
    cache: Arc<CacheStack>,
    interner: Arc<Interner>,
    config: EvaluatorConfig,
    consistency: Consistency,
    observed_seq: i64,
}

/// Mutates as the recursion proceeds: the visited-set for cycle
/// detection and the optional trace accumulator.
struct EvalState {
    visited: HashSet<(String, String, String, String, String)>,
    trace: Option<Vec<TraceStep>>,
}

/// Executes `check`/`bulk_check`/`expand`/`explain` against a tuple
/// store, schema registry, and cache stack.
pub struct Evaluator {
    store: Arc<dyn TupleStore>,
    schema: Arc<dyn SchemaRegistry>,
    cache: Arc<CacheStack>,
    interner: Arc<Interner>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn TupleStore>,
        schema: Arc<dyn SchemaRegistry>,
        cache: Arc<CacheStack>,
        interner: Arc<Interner>,
        config: EvaluatorConfig,
    ) -> Self {
        Self { store, schema, cache, interner, config }
    }

    pub async fn check(&self, req: CheckRequest) -> Result<Decision> {
        self.check_inner(req, false).await
    }

    pub async fn explain(&self, req: CheckRequest) -> Result<Decision> {
        self.check_inner(req, true).await
    }

    async fn check_inner(&self, req: CheckRequest, want_trace: bool) -> Result<Decision> {
        let tenant = req.tenant().to_string();

        let observed_seq = retry_store(&self.config, || self.store.current_seq(&tenant)).await?;

        if let Consistency::Bounded { token } = req.consistency {
            if observed_seq < token {
                return Err(EngineError::DeadlineExceeded);
            }
        }

        let schema = self.schema.current(&tenant).await?;

        let env = Env {
            tenant,
            store: self.store.clone(),
            schema,
            cache: self.cache.clone(),
            interner: self.interner.clone(),
            config: self.config,
            consistency: req.consistency,
            observed_seq,
        };

        if want_trace || matches!(req.consistency, Consistency::Strong) {
            return evaluate(env, req.principal, req.permission, req.object, want_trace).await;
        }

        let tiger_key = TigerKey {
            tenant: self.interner.intern(&env.tenant),
            subject_type: self.interner.intern(&req.principal.subject_type),
            subject_id: self.interner.intern(&req.principal.subject_id),
            permission: self.interner.intern(&req.permission),
        };
        let object_sym = self.interner.intern(&format!("{}:{}", req.object.object_type, req.object.object_id));

        let tiger_trustworthy = !self.cache.lag.is_lagging(&env.tenant, self.config.tiger_lag_threshold_ms);
        if tiger_trustworthy {
            match self.cache.tiger.probe(tiger_key, object_sym) {
                TigerProbe::Yes => return Ok(Decision::allow(observed_seq)),
                TigerProbe::No => return Ok(Decision::deny(observed_seq)),
                TigerProbe::Unknown => {}
            }
        }

        let quantum = self.cache.quantizer.quantum(Utc::now().timestamp());
        let final_key = FinalKey {
            tenant: tiger_key.tenant,
            subject_type: tiger_key.subject_type,
            subject_id: tiger_key.subject_id,
            permission: tiger_key.permission,
            object_type: self.interner.intern(&req.object.object_type),
            object_id: self.interner.intern(&req.object.object_id),
            quantum,
        };

        let decision = self
            .cache
            .final_cache
            .get_or_try_evaluate(final_key, async move {
                evaluate(env, req.principal, req.permission, req.object, false).await.map_err(NexusError::from)
            })
            .await;

        let decision = match decision {
            Ok(decision) => decision,
            Err(nexus_err) => {
                let nexus_err = (*nexus_err).clone();
                if nexus_err.resolves_to_deny() {
                    Decision::deny(observed_seq)
                } else {
                    // The placeholder wasn't cached (a failed attempt never is), but the
                    // fatal error must still reach the caller as itself, not a deny.
                    return Err(EngineError::Core(nexus_err));
                }
            }
        };

        self.cache.tiger.set(tiger_key, object_sym, decision.allow);
        Ok(decision)
    }

    pub async fn expand(&self, tenant_id: &str, object: &ObjectRef, relation: &str) -> Result<Vec<nexus_models::RelationTuple>> {
        let filter = TupleFilter { relation: Some(relation.to_string()), ..Default::default() };
        Ok(retry_store(&self.config, || self.store.lookup_by_object(tenant_id, &object.object_type, &object.object_id, &filter)).await?)
    }

    /// The immediate `parent` of `object`, if one is tupled. Used by the
    /// bulk paths to key the Directory Visibility cache — listings walk
    /// leaves grouped by their containing directory, not by a tree the
    /// engine itself materializes.
    pub(crate) async fn parent_of(&self, tenant_id: &str, object: &ObjectRef) -> Option<ObjectRef> {
        let filter = TupleFilter { relation: Some("parent".to_string()), ..Default::default() };
        let tuples = self.store.lookup_by_object(tenant_id, &object.object_type, &object.object_id, &filter).await.ok()?;
        tuples.into_iter().find(|t| t.subject_relation.is_none()).map(|t| ObjectRef::new(t.subject_type, t.subject_id))
    }

    /// `Some(false)` means the cache has already established that
    /// `subject` sees nothing under `directory` — safe to drop every
    /// object in that directory without a check. Any other verdict still
    /// requires a per-object check: `true` only promises *some*
    /// descendant is visible, not this one.
    pub(crate) async fn directory_pruned(
        &self,
        tenant_id: &str,
        subject_type: &str,
        subject_id: &str,
        directory: &ObjectRef,
    ) -> bool {
        let key = VisibilityKey {
            tenant: self.interner.intern(tenant_id),
            subject_type: self.interner.intern(subject_type),
            subject_id: self.interner.intern(subject_id),
            directory_type: self.interner.intern(&directory.object_type),
            directory_id: self.interner.intern(&directory.object_id),
        };
        matches!(self.cache.visibility.get(key).await, Some(false))
    }

    /// Records whether `subject` could see anything under `directory`,
    /// so the next listing under the same directory can prune via
    /// `directory_pruned` instead of re-checking every leaf.
    pub(crate) async fn record_directory_visibility(
        &self,
        tenant_id: &str,
        subject_type: &str,
        subject_id: &str,
        directory: &ObjectRef,
        visible: bool,
    ) {
        let key = VisibilityKey {
            tenant: self.interner.intern(tenant_id),
            subject_type: self.interner.intern(subject_type),
            subject_id: self.interner.intern(subject_id),
            directory_type: self.interner.intern(&directory.object_type),
            directory_id: self.interner.intern(&directory.object_id),
        };
        self.cache.visibility.set(key, visible).await;
    }
}

async fn evaluate(env: Env, principal: Principal, permission: String, object: ObjectRef, want_trace: bool) -> Result<Decision> {
    let mut state = EvalState { visited: HashSet::new(), trace: want_trace.then(Vec::new) };
    let allow = check_relation(&env, &mut state, &principal, &permission, &object).await?;
    Ok(Decision { allow, token: env.observed_seq, trace: state.trace })
}

fn check_relation<'a>(
    env: &'a Env,
    state: &'a mut EvalState,
    principal: &'a Principal,
    relation: &'a str,
    object: &'a ObjectRef,
) -> BoxFuture<'a, Result<bool>> {
    Box::pin(async move {
        let type_def = env
            .schema
            .type_def(&object.object_type)
            .ok_or_else(|| EngineError::Schema(nexus_schema::SchemaError::UnknownObjectType(object.object_type.clone())))?;
        check_relation_with_typedef(env, state, principal, relation, type_def, object).await
    })
}

fn check_relation_with_typedef<'a>(
    env: &'a Env,
    state: &'a mut EvalState,
    principal: &'a Principal,
    relation: &'a str,
    type_def: &'a TypeDefinition,
    object: &'a ObjectRef,
) -> BoxFuture<'a, Result<bool>> {
    Box::pin(async move {
        let visit_key = (
            object.object_type.clone(),
            object.object_id.clone(),
            relation.to_string(),
            principal.subject_type.clone(),
            principal.subject_id.clone(),
        );
        if !state.visited.insert(visit_key.clone()) {
            return Err(EngineError::CycleDetected(format!(
                "{}:{}#{} @ {}:{}",
                visit_key.0, visit_key.1, visit_key.2, visit_key.3, visit_key.4
            )));
        }

        let rule = type_def.relations.get(relation).ok_or_else(|| {
            EngineError::Schema(nexus_schema::SchemaError::UnknownPermission {
                object_type: type_def.object_type.clone(),
                permission: relation.to_string(),
            })
        })?;

        let result = reduce(env, state, Some(relation), rule, type_def, principal, object).await;
        state.visited.remove(&visit_key);
        result
    })
}

fn reduce<'a>(
    env: &'a Env,
    state: &'a mut EvalState,
    relation_name: Option<&'a str>,
    rule: &'a Rule,
    type_def: &'a TypeDefinition,
    principal: &'a Principal,
    object: &'a ObjectRef,
) -> BoxFuture<'a, Result<bool>> {
    Box::pin(async move {
        match rule {
            Rule::This => {
                let Some(relation) = relation_name else {
                    tracing::warn!("this() rule reached without a relation name in scope; denying");
                    return Ok(false);
                };
                check_direct(env, state, principal, relation, object).await
            }
            Rule::Computed { relation } => {
                if let Some(trace) = &mut state.trace {
                    trace.push(TraceStep::ComputedUserset {
                        from_relation: relation_name.unwrap_or_default().to_string(),
                        to_relation: relation.clone(),
                    });
                }
                check_relation_with_typedef(env, state, principal, relation, type_def, object).await
            }
            Rule::TupleToUserset { tupleset_relation, computed } => {
                let linked = retry_store(&env.config, || {
                    env.store.lookup_tupleset(&env.tenant, &object.object_type, &object.object_id, tupleset_relation)
                })
                .await?;

                for linked_object in &linked {
                    let Some(linked_type_def) = env.schema.type_def(&linked_object.object_type) else { continue };
                    if reduce(env, state, None, computed, linked_type_def, principal, linked_object).await? {
                        if let Some(trace) = &mut state.trace {
                            trace.push(TraceStep::TupleToUserset {
                                tupleset_relation: tupleset_relation.clone(),
                                linked_object: linked_object.clone(),
                                computed: format!("{computed:?}"),
                            });
                        }
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Rule::Union(rules) => {
                for (index, r) in rules.iter().enumerate() {
                    if reduce(env, state, relation_name, r, type_def, principal, object).await? {
                        if let Some(trace) = &mut state.trace {
                            trace.push(TraceStep::Union { matched_index: index });
                        }
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Rule::Intersection(rules) => {
                for r in rules {
                    if !reduce(env, state, relation_name, r, type_def, principal, object).await? {
                        return Ok(false);
                    }
                }
                if let Some(trace) = &mut state.trace {
                    trace.push(TraceStep::Intersection);
                }
                Ok(true)
            }
            Rule::Exclusion { base, subtract } => {
                if !reduce(env, state, relation_name, base, type_def, principal, object).await? {
                    return Ok(false);
                }
                if reduce(env, state, relation_name, subtract, type_def, principal, object).await? {
                    return Ok(false);
                }
                if let Some(trace) = &mut state.trace {
                    trace.push(TraceStep::Exclusion);
                }
                Ok(true)
            }
        }
    })
}

fn classify_family(relation: &str) -> SubproblemFamily {
    if relation == "parent" {
        SubproblemFamily::Ancestry
    } else if relation == "member" {
        SubproblemFamily::Membership
    } else {
        SubproblemFamily::Grant
    }
}

fn check_direct<'a>(
    env: &'a Env,
    state: &'a mut EvalState,
    principal: &'a Principal,
    relation: &'a str,
    object: &'a ObjectRef,
) -> BoxFuture<'a, Result<bool>> {
    Box::pin(async move {
        if principal.tenant_id != env.tenant {
            return check_cross_tenant(env, state, principal, relation, object).await;
        }

        let family = classify_family(relation);
        let key = SubjectRelationObjectKey {
            tenant: env.interner.intern(&env.tenant),
            subject_type: env.interner.intern(&principal.subject_type),
            subject_id: env.interner.intern(&principal.subject_id),
            relation: env.interner.intern(relation),
            object_type: env.interner.intern(&object.object_type),
            object_id: env.interner.intern(&object.object_id),
        };

        if let Some(cached) = env.cache.subproblem.get(family, key).await {
            let fresh_enough = match env.consistency {
                Consistency::Strong => cached.seq >= env.observed_seq,
                Consistency::Bounded { token } => cached.seq >= token,
                Consistency::Eventual => true,
            };
            if fresh_enough {
                return Ok(cached.value);
            }
        }

        let filter = TupleFilter { relation: Some(relation.to_string()), ..Default::default() };
        let tuples = retry_store(&env.config, || {
            env.store.lookup_by_object(&env.tenant, &object.object_type, &object.object_id, &filter)
        })
        .await?;

        let now = Utc::now();
        let mut result = false;

        for tuple in tuples.iter().filter(|t| !t.is_expired(now) && t.subject_relation.is_none()) {
            if tuple.subject_type == principal.subject_type && tuple.subject_id == principal.subject_id {
                result = true;
                if let Some(trace) = &mut state.trace {
                    trace.push(TraceStep::DirectTuple {
                        object: object.clone(),
                        relation: relation.to_string(),
                        subject_type: tuple.subject_type.clone(),
                        subject_id: tuple.subject_id.clone(),
                    });
                }
                break;
            }
        }

        if !result {
            for tuple in tuples.iter().filter(|t| !t.is_expired(now) && t.subject_relation.is_some()) {
                let sub_relation = tuple.subject_relation.clone().unwrap();

                if env.consistency != Consistency::Strong && sub_relation == "member" {
                    let leopard_key = LeopardKey {
                        tenant: env.interner.intern(&env.tenant),
                        subject_type: env.interner.intern(&principal.subject_type),
                        subject_id: env.interner.intern(&principal.subject_id),
                    };
                    let group = env.interner.intern(&tuple.subject_id);
                    if let Some(is_member) = env.cache.leopard.is_member(leopard_key, group) {
                        if is_member {
                            result = true;
                        }
                        if result {
                            if let Some(trace) = &mut state.trace {
                                trace.push(TraceStep::Userset {
                                    object: object.clone(),
                                    relation: relation.to_string(),
                                    via_type: tuple.subject_type.clone(),
                                    via_id: tuple.subject_id.clone(),
                                    via_relation: sub_relation.clone(),
                                });
                            }
                            break;
                        }
                        continue;
                    }
                }

                let linked = ObjectRef::new(tuple.subject_type.clone(), tuple.subject_id.clone());
                if check_relation(env, state, principal, &sub_relation, &linked).await? {
                    result = true;
                    if let Some(trace) = &mut state.trace {
                        trace.push(TraceStep::Userset {
                            object: object.clone(),
                            relation: relation.to_string(),
                            via_type: tuple.subject_type.clone(),
                            via_id: tuple.subject_id.clone(),
                            via_relation: sub_relation,
                        });
                    }
                    break;
                }
            }
        }

        env.cache.subproblem.set(family, key, result, env.observed_seq).await;
        Ok(result)
    })
}

/// `principal.tenant_id != env.tenant`: the only way this can resolve to
/// true is a `shared_*` grant in the Cross-Tenant Grant Index. The
/// ordinary relation graph in `env.tenant`'s store is never consulted for
/// a foreign principal — it has no membership or ownership edges for a
/// subject that belongs to a different tenant.
fn check_cross_tenant<'a>(
    env: &'a Env,
    state: &'a mut EvalState,
    principal: &'a Principal,
    relation: &'a str,
    object: &'a ObjectRef,
) -> BoxFuture<'a, Result<bool>> {
    Box::pin(async move {
        if !relation.starts_with("shared_") {
            return Ok(false);
        }

        let object_tenant = env.interner.intern(&env.tenant);
        let object_type = env.interner.intern(&object.object_type);
        let object_id = env.interner.intern(&object.object_id);
        let subject_tenant = env.interner.intern(&principal.tenant_id);
        let subject_type = env.interner.intern(&principal.subject_type);
        let subject_id = env.interner.intern(&principal.subject_id);
        let relation_sym = env.interner.intern(relation);

        let matched = env.cache.cross_tenant.grants_on_object(object_tenant, object_type, object_id).into_iter().any(|g| {
            g.subject_tenant == subject_tenant && g.subject_type == subject_type && g.subject_id == subject_id && g.relation == relation_sym
        });

        if matched {
            if let Some(trace) = &mut state.trace {
                trace.push(TraceStep::DirectTuple {
                    object: object.clone(),
                    relation: relation.to_string(),
                    subject_type: principal.subject_type.clone(),
                    subject_id: principal.subject_id.clone(),
                });
            }
        }

        Ok(matched)
    })
}

async fn retry_store<T, F, Fut>(config: &EvaluatorConfig, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(StoreError::Database(e)) if attempt + 1 < config.retry_attempts => {
                tokio::time::sleep(config.backoff(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(EngineError::Store(e)),
        }
    }
}
