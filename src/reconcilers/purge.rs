// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Purge reconciler - unblocks deletion of a Kyma whose target keeps custom
//! resources alive through finalizers.
//!
//! Every Kyma carries the purge finalizer. Once a Kyma has been deleting for
//! longer than the purge timeout, the finalizers of all custom resources on
//! its target are stripped and the purge finalizer is removed, so deletion
//! completes even when the target never cleans up by itself.

use crate::constants::{finalizers::PURGE, OPERATOR_GROUP};
use crate::error::{ErrorCategory, Result, SyncError};
use crate::events::{reasons, EventPublisher};
use crate::kubernetes::cache::TargetKey;
use crate::metrics::{self, PurgeErrorCategory};
use crate::remote::context::SkrContextProvider;
use crate::types::Kyma;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::runtime::{controller::Action, watcher, Controller};
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest single wait for a grace period; longer periods are re-evaluated
const MAX_GRACE_REQUEUE: Duration = Duration::from_secs(60 * 60);

/// Time left until a Kyma deleted at `deleted_at` may be purged, or `None`
/// once `timeout` has elapsed
pub fn remaining_grace(
    deleted_at: DateTime<Utc>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let elapsed = (now - deleted_at).to_std().unwrap_or(Duration::ZERO);
    Some(timeout.saturating_sub(elapsed)).filter(|d| !d.is_zero())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CrdPattern {
    Any,
    Group(String),
    Name(String),
}

/// Selects the CRDs whose resources are left alone by the purge.
///
/// Built from a comma separated list where each entry is either a full CRD
/// name (`certificates.cert-manager.io`), a whole group (`*.cert-manager.io`)
/// or `*` for every CRD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrdMatcher {
    patterns: Vec<CrdPattern>,
}

impl CrdMatcher {
    pub fn from_patterns(patterns: &str) -> Self {
        let patterns = patterns
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p == "*" {
                    CrdPattern::Any
                } else if let Some(group) = p.strip_prefix("*.") {
                    CrdPattern::Group(group.to_string())
                } else {
                    CrdPattern::Name(p)
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, crd: &CustomResourceDefinition) -> bool {
        let group = crd.spec.group.to_ascii_lowercase();
        let name = crd.name_any().to_ascii_lowercase();
        self.patterns.iter().any(|pattern| match pattern {
            CrdPattern::Any => true,
            CrdPattern::Group(g) => *g == group,
            CrdPattern::Name(n) => *n == name,
        })
    }
}

fn is_kyma_crd(crd: &CustomResourceDefinition) -> bool {
    crd.spec.group == OPERATOR_GROUP && crd.spec.names.kind == Kyma::kind(&())
}

/// The storage version of `crd` as a dynamic API resource
fn storage_resource(crd: &CustomResourceDefinition) -> Option<ApiResource> {
    let version = crd.spec.versions.iter().find(|v| v.storage)?;
    let gvk = GroupVersionKind::gvk(&crd.spec.group, &version.name, &crd.spec.names.kind);
    Some(ApiResource::from_gvk_with_plural(&gvk, &crd.spec.names.plural))
}

pub struct PurgeReconciler {
    kcp_client: Client,
    contexts: Arc<SkrContextProvider>,
    events: Arc<dyn EventPublisher>,
    timeout: Duration,
    skip_crds: CrdMatcher,
}

impl PurgeReconciler {
    pub fn new(
        kcp_client: Client,
        contexts: Arc<SkrContextProvider>,
        events: Arc<dyn EventPublisher>,
        timeout: Duration,
        skip_crds: CrdMatcher,
    ) -> Self {
        Self {
            kcp_client,
            contexts,
            events,
            timeout,
            skip_crds,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let kymas: Api<Kyma> = Api::all(self.kcp_client.clone());
        let context = Arc::new(self);

        Controller::new(kymas, watcher::Config::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Purge reconciled kyma: {:?}", o),
                    Err(e) => warn!("Purge reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn kymas(&self, kyma: &Kyma) -> Api<Kyma> {
        Api::namespaced(self.kcp_client.clone(), &kyma.namespace().unwrap_or_default())
    }

    /// Drive `kyma` one step through the purge lifecycle as of `now`
    pub async fn purge(&self, kyma: &Kyma, now: DateTime<Utc>) -> Result<Action> {
        let Some(deleted_at) = kyma.metadata.deletion_timestamp.as_ref().map(|t| t.0) else {
            return self.handle_not_marked_for_deletion(kyma).await;
        };

        if let Some(remaining) = remaining_grace(deleted_at, self.timeout, now) {
            let requeue = remaining.min(MAX_GRACE_REQUEUE);
            info!(
                "Purge for Kyma {} will be requeued after {:?}",
                kyma.name_any(),
                requeue
            );
            return Ok(Action::requeue(requeue));
        }

        let start = Instant::now();
        let key = TargetKey::from(kyma);
        let context = match self.contexts.init(&key).await {
            Ok(()) => self.contexts.get(&key).await,
            Err(e) => Err(e),
        };
        match context {
            Ok(context) => self.handle_purge(kyma, context.client(), start).await,
            Err(e) if e.is_not_found() => self.handle_target_gone(kyma).await,
            Err(e) => Err(e),
        }
    }

    async fn handle_not_marked_for_deletion(&self, kyma: &Kyma) -> Result<Action> {
        if let Err(e) = self.ensure_purge_finalizer(kyma).await {
            debug!("Failed setting purge finalizer for Kyma {}: {}", kyma.name_any(), e);
            self.events
                .warning(&kyma.object_ref(&()), reasons::SETTING_PURGE_FINALIZER_FAILED, &e)
                .await;
            return Err(e);
        }
        Ok(Action::await_change())
    }

    async fn handle_target_gone(&self, kyma: &Kyma) -> Result<Action> {
        let name = kyma.name_any();
        let dropped = match self.drop_purge_finalizer(kyma).await {
            Ok(dropped) => dropped,
            Err(e) => return Err(self.removing_finalizer_failed(kyma, e).await),
        };
        metrics::clear_purge_errors(&name);
        if !dropped {
            return Ok(Action::await_change());
        }
        info!("Removed purge finalizer for Kyma {}", name);
        Ok(Action::requeue(Duration::from_secs(1)))
    }

    /// Strip all finalizers on the target, then release the Kyma
    pub async fn handle_purge(
        &self,
        kyma: &Kyma,
        skr_client: &Client,
        start: Instant,
    ) -> Result<Action> {
        let name = kyma.name_any();
        metrics::count_purge();

        let (handled, result) = self.perform_cleanup(skr_client).await;
        if !handled.is_empty() {
            info!(
                "Removed all finalizers for Kyma {} related resources {}",
                name,
                handled.join(", ")
            );
        }
        if let Err(e) = result {
            error!("Failed purge cleanup for Kyma {}: {}", name, e);
            metrics::set_purge_error(&name, PurgeErrorCategory::Cleanup);
            return Err(e);
        }

        match self.drop_purge_finalizer(kyma).await {
            Ok(true) => info!("Removed purge finalizer for Kyma {}", name),
            Ok(false) => {}
            Err(e) => return Err(self.removing_finalizer_failed(kyma, e).await),
        }
        metrics::clear_purge_errors(&name);

        metrics::record_purge_time(start.elapsed());
        Ok(Action::await_change())
    }

    async fn removing_finalizer_failed(&self, kyma: &Kyma, err: SyncError) -> SyncError {
        error!(
            "Failed removing purge finalizer from Kyma {}/{}: {}",
            kyma.namespace().unwrap_or_default(),
            kyma.name_any(),
            err
        );
        self.events
            .warning(&kyma.object_ref(&()), reasons::REMOVING_PURGE_FINALIZER_FAILED, &err)
            .await;
        metrics::set_purge_error(&kyma.name_any(), PurgeErrorCategory::FinalizerRemoval);
        err
    }

    /// Strip finalizers from every remaining custom resource on the target.
    /// Returns the `<namespace>/<name>` of every handled resource alongside
    /// the joined failures.
    async fn perform_cleanup(&self, skr_client: &Client) -> (Vec<String>, Result<()>) {
        let crds: Api<CustomResourceDefinition> = Api::all(skr_client.clone());
        let crds = match crds.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(e) => return (Vec::new(), Err(e.into())),
        };

        let mut handled = Vec::new();
        let mut errs = Vec::new();
        for crd in crds
            .iter()
            .filter(|crd| !is_kyma_crd(crd) && !self.skip_crds.matches(crd))
        {
            let Some(resource) = storage_resource(crd) else {
                continue;
            };
            let namespaced = crd.spec.scope == "Namespaced";
            match drop_finalizers(skr_client, &resource, namespaced).await {
                Ok(names) => handled.extend(names),
                Err(mut failures) => errs.append(&mut failures),
            }
        }

        if errs.is_empty() {
            (handled, Ok(()))
        } else {
            (
                handled,
                Err(SyncError::aggregate(ErrorCategory::PurgeCleanup, errs)),
            )
        }
    }

    async fn ensure_purge_finalizer(&self, kyma: &Kyma) -> Result<()> {
        let mut finalizers = kyma.finalizers().to_vec();
        if finalizers.iter().any(|f| f == PURGE) {
            return Ok(());
        }
        finalizers.push(PURGE.to_string());
        self.patch_finalizers(kyma, finalizers).await
    }

    /// Returns whether the finalizer was present
    async fn drop_purge_finalizer(&self, kyma: &Kyma) -> Result<bool> {
        if !kyma.finalizers().iter().any(|f| f == PURGE) {
            return Ok(false);
        }
        let finalizers: Vec<String> = kyma
            .finalizers()
            .iter()
            .filter(|f| *f != PURGE)
            .cloned()
            .collect();
        self.patch_finalizers(kyma, finalizers).await?;
        Ok(true)
    }

    async fn patch_finalizers(&self, kyma: &Kyma, finalizers: Vec<String>) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.kymas(kyma)
            .patch(&kyma.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|source| SyncError::Finalizer {
                name: kyma.name_any(),
                source,
            })?;
        Ok(())
    }
}

/// Remove the finalizers of every instance of `resource`, one request per
/// instance that still has any
async fn drop_finalizers(
    client: &Client,
    resource: &ApiResource,
    namespaced: bool,
) -> std::result::Result<Vec<String>, Vec<SyncError>> {
    let all: Api<DynamicObject> = Api::all_with(client.clone(), resource);
    let instances = all
        .list(&ListParams::default())
        .await
        .map_err(|e| vec![SyncError::from(e)])?
        .items;

    let patch = serde_json::json!({ "metadata": { "finalizers": null } });
    let mut handled = Vec::new();
    let mut errs = Vec::new();
    for instance in instances.iter().filter(|i| !i.finalizers().is_empty()) {
        let namespace = instance.namespace().unwrap_or_default();
        let name = instance.name_any();
        let api: Api<DynamicObject> = if namespaced {
            Api::namespaced_with(client.clone(), &namespace, resource)
        } else {
            Api::all_with(client.clone(), resource)
        };
        match api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => handled.push(format!("{}/{}", namespace, name)),
            Err(source) => errs.push(SyncError::Finalizer {
                name: format!("{} {}/{}", resource.kind, namespace, name),
                source,
            }),
        }
    }

    if errs.is_empty() {
        Ok(handled)
    } else {
        Err(errs)
    }
}

async fn reconcile(kyma: Arc<Kyma>, ctx: Arc<PurgeReconciler>) -> Result<Action> {
    ctx.purge(&kyma, Utc::now()).await
}

fn error_policy(kyma: Arc<Kyma>, error: &SyncError, _ctx: Arc<PurgeReconciler>) -> Action {
    error!("Purge of Kyma {} failed: {}", kyma.name_any(), error);
    Action::requeue(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPublisher;
    use crate::kubernetes::cache::ConnectionCache;
    use crate::kubernetes::client::{ClientFactory, RateLimits};
    use crate::test_utils::{list_json, MockService, RecordingPublisher};
    use crate::types::kyma::KymaSpec;
    use chrono::TimeDelta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    const KCP_KYMA: &str = "/apis/operator.kyma-project.io/v1beta2/namespaces/kcp-system/kymas/kyma-1";
    const CRDS: &str = "/apis/apiextensions.k8s.io/v1/customresourcedefinitions";
    const TIMEOUT: Duration = Duration::from_secs(300);

    fn crd(group: &str, plural: &str, kind: &str, scope: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": format!("{}.{}", plural, group)},
            "spec": {
                "group": group,
                "names": {"kind": kind, "plural": plural},
                "scope": scope,
                "versions": [
                    {"name": "v1alpha1", "served": true, "storage": false},
                    {"name": "v1", "served": true, "storage": true}
                ]
            }
        })
    }

    fn widget(namespace: &str, name: &str, finalizers: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": name, "namespace": namespace, "finalizers": finalizers}
        })
    }

    fn kyma(finalizers: &[&str], deleted_ago: Option<Duration>, now: DateTime<Utc>) -> Kyma {
        let mut kyma = Kyma::new(
            "kyma-1",
            KymaSpec {
                channel: "regular".to_string(),
                modules: vec![],
            },
        );
        kyma.metadata.namespace = Some("kcp-system".to_string());
        kyma.metadata.finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
        kyma.metadata.deletion_timestamp = deleted_ago
            .map(|ago| Time(now - TimeDelta::from_std(ago).unwrap()));
        kyma
    }

    fn kyma_json() -> String {
        serde_json::json!({
            "apiVersion": "operator.kyma-project.io/v1beta2",
            "kind": "Kyma",
            "metadata": {"name": "kyma-1", "namespace": "kcp-system"},
            "spec": {"channel": "regular"}
        })
        .to_string()
    }

    /// Target clients are never built in these tests
    struct NoTargets;

    #[async_trait::async_trait]
    impl crate::kubernetes::client::AccessConfigProvider for NoTargets {
        async fn get_access_config(&self, key: &TargetKey) -> Result<kube::Config> {
            Err(SyncError::AccessSecretNotFound(key.to_string()))
        }
    }

    fn reconciler(kcp: &MockService, skip: &str) -> (PurgeReconciler, RecordingPublisher) {
        reconciler_with(kcp, None, skip, TIMEOUT)
    }

    /// Reconciler whose target, when given, is served by `skr` from the
    /// connection cache
    fn reconciler_with(
        kcp: &MockService,
        skr: Option<&MockService>,
        skip: &str,
        timeout: Duration,
    ) -> (PurgeReconciler, RecordingPublisher) {
        let events = RecordingPublisher::default();
        let publisher: Arc<dyn EventPublisher> = Arc::new(events.clone());
        let cache = Arc::new(ConnectionCache::new());
        if let Some(skr) = skr {
            cache.put(TargetKey::new("kcp-system", "kyma-1"), skr.clone().into_client());
        }
        let factory = ClientFactory::new(cache, Arc::new(NoTargets), RateLimits::default());
        let contexts = Arc::new(SkrContextProvider::new(Arc::new(factory), publisher.clone()));
        (
            PurgeReconciler::new(
                kcp.clone().into_client(),
                contexts,
                publisher,
                timeout,
                CrdMatcher::from_patterns(skip),
            ),
            events,
        )
    }

    const WIDGETS: &str = "/apis/example.com/v1";

    /// Target with a kyma, a widget and a certificate CRD, where only widget
    /// `a/w1` still carries a finalizer
    fn target_with_widgets() -> MockService {
        MockService::new()
            .on_get(
                CRDS,
                200,
                &list_json(
                    "apiextensions.k8s.io/v1",
                    "CustomResourceDefinition",
                    vec![
                        crd("operator.kyma-project.io", "kymas", "Kyma", "Namespaced"),
                        crd("example.com", "widgets", "Widget", "Namespaced"),
                        crd("cert-manager.io", "certificates", "Certificate", "Namespaced"),
                    ],
                ),
            )
            .on_get(
                &format!("{WIDGETS}/widgets"),
                200,
                &list_json(
                    "example.com/v1",
                    "Widget",
                    vec![widget("a", "w1", &["example.com/cleanup"]), widget("a", "w2", &[])],
                ),
            )
            .on_patch(
                &format!("{WIDGETS}/namespaces/a/widgets/w1"),
                200,
                &widget("a", "w1", &[]).to_string(),
            )
    }

    #[test]
    fn test_remaining_grace() {
        let now = Utc::now();
        let one_sec = TimeDelta::seconds(1);
        let deleted = now - TimeDelta::from_std(TIMEOUT).unwrap() + one_sec;
        assert_eq!(
            remaining_grace(deleted, TIMEOUT, now),
            Some(Duration::from_secs(1))
        );

        let deleted = now - TimeDelta::from_std(TIMEOUT).unwrap() - one_sec;
        assert_eq!(remaining_grace(deleted, TIMEOUT, now), None);
        assert_eq!(remaining_grace(now - TimeDelta::from_std(TIMEOUT).unwrap(), TIMEOUT, now), None);
    }

    #[test]
    fn test_unrepresentable_deadline_never_elapses() {
        let now = Utc::now();
        let forever = Duration::from_secs(u64::MAX);

        assert_eq!(remaining_grace(now, forever, now), Some(forever));
        assert_eq!(
            remaining_grace(now - TimeDelta::days(365), forever, now),
            Some(forever - Duration::from_secs(365 * 24 * 60 * 60))
        );
    }

    #[tokio::test]
    async fn test_long_grace_period_is_requeued_in_steps() {
        let kcp = MockService::new();
        let skr = target_with_widgets();
        let (reconciler, _) =
            reconciler_with(&kcp, Some(&skr), "", Duration::from_secs(u64::MAX));
        let now = Utc::now();
        let kyma = kyma(&[PURGE], Some(Duration::from_secs(60)), now);

        let action = reconciler.purge(&kyma, now).await.unwrap();

        assert_eq!(action, Action::requeue(MAX_GRACE_REQUEUE));
        assert!(kcp.requests().is_empty());
        assert!(skr.requests().is_empty());
    }

    #[test]
    fn test_crd_matcher_patterns() {
        let named = |group: &str, plural: &str| -> CustomResourceDefinition {
            serde_json::from_value(crd(group, plural, "Thing", "Namespaced")).unwrap()
        };
        let matcher = CrdMatcher::from_patterns("certificates.cert-manager.io, *.istio.io");

        assert!(matcher.matches(&named("cert-manager.io", "certificates")));
        assert!(!matcher.matches(&named("cert-manager.io", "issuers")));
        assert!(matcher.matches(&named("istio.io", "gateways")));
        assert!(!matcher.matches(&named("networking.istio.io", "gateways")));
        assert!(CrdMatcher::from_patterns("*").matches(&named("example.com", "widgets")));
        assert!(!CrdMatcher::from_patterns("").matches(&named("example.com", "widgets")));
    }

    #[test]
    fn test_storage_version_is_used() {
        let crd: CustomResourceDefinition =
            serde_json::from_value(crd("example.com", "widgets", "Widget", "Namespaced")).unwrap();
        let resource = storage_resource(&crd).unwrap();
        assert_eq!(resource.api_version, "example.com/v1");
        assert_eq!(resource.plural, "widgets");
    }

    #[tokio::test]
    async fn test_purge_finalizer_added_to_live_kyma() {
        let kcp = MockService::new().on_patch(KCP_KYMA, 200, &kyma_json());
        let (reconciler, _) = reconciler(&kcp, "");
        let now = Utc::now();

        let action = reconciler.purge(&kyma(&["other"], None, now), now).await.unwrap();
        assert_eq!(action, Action::await_change());
        let body = kcp.requests_to("PATCH", KCP_KYMA)[0].json();
        assert_eq!(body["metadata"]["finalizers"], serde_json::json!(["other", PURGE]));

        reconciler.purge(&kyma(&[PURGE], None, now), now).await.unwrap();
        assert_eq!(kcp.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_to_set_finalizer_emits_warning() {
        let kcp = MockService::new().on_patch(
            KCP_KYMA,
            409,
            &serde_json::json!({
                "kind": "Status", "apiVersion": "v1", "status": "Failure",
                "message": "conflict", "reason": "Conflict", "code": 409
            })
            .to_string(),
        );
        let (reconciler, events) = reconciler(&kcp, "");
        let now = Utc::now();

        assert!(reconciler.purge(&kyma(&[], None, now), now).await.is_err());
        assert_eq!(events.reasons(), vec!["SettingPurgeFinalizerFailed"]);
    }

    #[tokio::test]
    async fn test_purge_waits_for_grace_period() {
        let kcp = MockService::new();
        let (reconciler, _) = reconciler(&kcp, "");
        let now = Utc::now();
        let kyma = kyma(&[PURGE], Some(TIMEOUT - Duration::from_secs(1)), now);

        let action = reconciler.purge(&kyma, now).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        assert!(kcp.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_drops_finalizer() {
        let kcp = MockService::new().on_patch(KCP_KYMA, 200, &kyma_json());
        let (reconciler, _) = reconciler(&kcp, "");
        let now = Utc::now();
        let kyma = kyma(&[PURGE, "other"], Some(TIMEOUT + Duration::from_secs(1)), now);

        let action = reconciler.purge(&kyma, now).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        let body = kcp.requests_to("PATCH", KCP_KYMA)[0].json();
        assert_eq!(body["metadata"]["finalizers"], serde_json::json!(["other"]));
    }

    #[tokio::test]
    async fn test_purge_strips_finalizers_on_target() {
        let skr = target_with_widgets();
        let kcp = MockService::new().on_patch(KCP_KYMA, 200, &kyma_json());
        let (reconciler, _) = reconciler_with(&kcp, Some(&skr), "*.cert-manager.io", TIMEOUT);
        let now = Utc::now();
        let kyma = kyma(&[PURGE], Some(TIMEOUT + Duration::from_secs(1)), now);

        let action = reconciler.purge(&kyma, now).await.unwrap();

        assert_eq!(action, Action::await_change());
        let stripped = skr.requests_to("PATCH", "/apis");
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped[0].path, format!("{WIDGETS}/namespaces/a/widgets/w1"));
        assert_eq!(stripped[0].json()["metadata"]["finalizers"], serde_json::Value::Null);
        assert!(skr.requests_to("GET", "/apis/operator.kyma-project.io").is_empty());
        assert!(skr.requests_to("GET", "/apis/cert-manager.io").is_empty());
        let body = kcp.requests_to("PATCH", KCP_KYMA)[0].json();
        assert_eq!(body["metadata"]["finalizers"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_purge_runs_without_purge_finalizer() {
        let skr = target_with_widgets();
        let kcp = MockService::new();
        let (reconciler, _) = reconciler_with(&kcp, Some(&skr), "", TIMEOUT);
        let now = Utc::now();
        let kyma = kyma(&["other-finalizer"], Some(TIMEOUT + Duration::from_secs(60)), now);

        let action = reconciler.purge(&kyma, now).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(skr.requests_to("GET", CRDS).len(), 1);
        let stripped = skr.requests_to("PATCH", "/apis");
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped[0].path, format!("{WIDGETS}/namespaces/a/widgets/w1"));
        assert!(kcp.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_without_purge_finalizer_waits() {
        let kcp = MockService::new();
        let (reconciler, _) = reconciler(&kcp, "");
        let now = Utc::now();
        let kyma = kyma(&["other"], Some(TIMEOUT + Duration::from_secs(1)), now);

        let action = reconciler.purge(&kyma, now).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(kcp.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_failures_keep_purge_finalizer() {
        let status = serde_json::json!({
            "kind": "Status", "apiVersion": "v1", "status": "Failure",
            "message": "forbidden", "reason": "Forbidden", "code": 403
        })
        .to_string();
        let skr = MockService::new()
            .on_get(
                CRDS,
                200,
                &list_json(
                    "apiextensions.k8s.io/v1",
                    "CustomResourceDefinition",
                    vec![crd("example.com", "widgets", "Widget", "Namespaced")],
                ),
            )
            .on_get(
                "/apis/example.com/v1/widgets",
                200,
                &list_json(
                    "example.com/v1",
                    "Widget",
                    vec![widget("a", "w1", &["x"]), widget("b", "w2", &["y"])],
                ),
            )
            .on_patch("/apis/example.com/v1/namespaces/a", 403, &status)
            .on_patch(
                "/apis/example.com/v1/namespaces/b/widgets/w2",
                200,
                &widget("b", "w2", &[]).to_string(),
            );
        let kcp = MockService::new();
        let (reconciler, _) = reconciler(&kcp, "");
        let now = Utc::now();
        let kyma = kyma(&[PURGE], Some(TIMEOUT + Duration::from_secs(1)), now);

        let err = reconciler
            .handle_purge(&kyma, &skr.clone().into_client(), Instant::now())
            .await
            .unwrap_err();

        assert!(err.has_category(ErrorCategory::PurgeCleanup));
        assert_eq!(skr.requests_to("PATCH", "/apis/example.com").len(), 2);
        assert!(kcp.requests().is_empty());
    }
}
