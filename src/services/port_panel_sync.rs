use serde_json::json;
use std::sync::Arc;

use crate::db::{
    HistoryRepo, PanelPortRepo, PanelPortWrite, PanelRepo, PortRepo, PortWrite, RetryPolicy,
    Store, SwitchRepo, UnitOfWork,
};
use crate::error::SyncError;
use crate::models::*;

use super::snapshots;

/// Keeps a switch port row and the patch/fiber panel port row describing the
/// same cable consistent. Every change runs in one retried unit of work that
/// also appends the audit entry.
pub struct PortPanelSync {
    store: Store,
    policy: RetryPolicy,
    default_actor: String,
}

/// A sync request that passed the checks needing no database access
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub switch_id: i64,
    pub port_no: i64,
    pub panel: Option<PanelRef>,
    pub link_type: Option<String>,
    pub device: Option<String>,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub connection_info: Option<String>,
    pub actor: String,
}

impl SyncPlan {
    pub fn from_request(req: &SyncPortRequest, default_actor: &str) -> Result<Self, SyncError> {
        if req.switch_id <= 0 || req.port <= 0 {
            return Err(SyncError::validation("Invalid switchId or port"));
        }

        let panel = match (positive_or_absent(req.panel_id)?, positive_or_absent(req.panel_port)?) {
            (None, None) => None,
            (Some(panel_id), Some(port_number)) => {
                let family = req
                    .panel_type
                    .as_deref()
                    .and_then(PanelFamily::parse)
                    .ok_or_else(|| SyncError::validation("Invalid panelType (expected patch or fiber)"))?;
                Some(PanelRef {
                    family,
                    panel_id,
                    port_number,
                })
            }
            _ => {
                return Err(SyncError::validation(
                    "panelId and panelPort must be supplied together",
                ))
            }
        };

        Ok(Self {
            switch_id: req.switch_id,
            port_no: req.port,
            panel,
            link_type: req.link_type.as_deref().map(link_type::normalize),
            device: trimmed(&req.device),
            ip: trimmed(&req.ip),
            mac: trimmed(&req.mac),
            connection_info: req.connection_info.clone(),
            actor: actor_or_default(&req.actor, default_actor),
        })
    }
}

/// A disconnect request that passed the checks needing no database access
#[derive(Debug, Clone)]
pub struct DisconnectPlan {
    pub family: PanelFamily,
    pub panel_id: i64,
    pub port_number: i64,
    pub actor: String,
}

impl DisconnectPlan {
    pub fn from_request(req: &DisconnectPanelPortRequest, default_actor: &str) -> Result<Self, SyncError> {
        if req.panel_id <= 0 || req.port_number <= 0 {
            return Err(SyncError::validation("Invalid panelId or portNumber"));
        }
        let family = PanelFamily::parse(&req.panel_type)
            .ok_or_else(|| SyncError::validation("Invalid panelType (expected patch or fiber)"))?;
        Ok(Self {
            family,
            panel_id: req.panel_id,
            port_number: req.port_number,
            actor: actor_or_default(&req.actor, default_actor),
        })
    }
}

/// Forms send 0 for "no panel"; negative ids are malformed.
fn positive_or_absent(v: Option<i64>) -> Result<Option<i64>, SyncError> {
    match v {
        None | Some(0) => Ok(None),
        Some(n) if n > 0 => Ok(Some(n)),
        Some(_) => Err(SyncError::validation("Invalid panelId or panelPort")),
    }
}

fn trimmed(v: &Option<String>) -> Option<String> {
    v.as_deref().map(|s| s.trim().to_string())
}

fn actor_or_default(actor: &str, default_actor: &str) -> String {
    let actor = actor.trim();
    if actor.is_empty() {
        default_actor.to_string()
    } else {
        actor.to_string()
    }
}

impl PortPanelSync {
    pub fn new(store: Store, policy: RetryPolicy, default_actor: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            store,
            policy,
            default_actor: default_actor.into(),
        })
    }

    /// Apply one connection change to both sides of the cable
    pub async fn sync_port(&self, req: &SyncPortRequest) -> Result<SyncOutcome, SyncError> {
        let plan = SyncPlan::from_request(req, &self.default_actor)?;

        let mut uow = self.store.unit_of_work().await?;
        let outcome = uow
            .run_with_retry(self.policy, |uow| {
                let plan = plan.clone();
                Box::pin(async move { apply_port_sync(uow, &plan).await })
            })
            .await?;

        tracing::info!(
            switch_id = outcome.switch_id,
            port = outcome.port,
            panel = ?plan.panel,
            action = outcome.action.as_str(),
            actor = %plan.actor,
            "Port synchronized"
        );
        Ok(outcome)
    }

    /// Remove the cable on a panel port from both sides
    pub async fn disconnect_panel_port(
        &self,
        req: &DisconnectPanelPortRequest,
    ) -> Result<DisconnectOutcome, SyncError> {
        let plan = DisconnectPlan::from_request(req, &self.default_actor)?;

        let mut uow = self.store.unit_of_work().await?;
        let outcome = uow
            .run_with_retry(self.policy, |uow| {
                let plan = plan.clone();
                Box::pin(async move { apply_disconnect(uow, &plan).await })
            })
            .await?;

        tracing::info!(
            panel_type = %plan.family,
            panel_id = plan.panel_id,
            port_number = plan.port_number,
            switch_id = ?outcome.disconnected_switch_id,
            actor = %plan.actor,
            "Panel port disconnected"
        );
        Ok(outcome)
    }
}

/// One attempt of a port sync. Must run inside an open transaction on `uow`.
///
/// Reads follow the fixed lock order switch, panel, port, panel port.
pub async fn apply_port_sync(uow: &mut UnitOfWork, plan: &SyncPlan) -> Result<SyncOutcome, SyncError> {
    let switch = SwitchRepo::find(uow.conn(), plan.switch_id)
        .await?
        .ok_or_else(|| SyncError::validation(format!("Switch {} not found", plan.switch_id)))?;
    let fiber_port = switch.is_fiber_port(plan.port_no);

    let panel = match plan.panel {
        Some(r) => {
            let panel = PanelRepo::lock(uow.conn(), r.family, r.panel_id)
                .await?
                .ok_or_else(|| {
                    SyncError::validation(format!("{} panel {} not found", r.family, r.panel_id))
                })?;
            check_panel_binding(&switch, plan.port_no, fiber_port, &r, &panel)?;
            Some((r, panel))
        }
        None => None,
    };

    let existing_port = PortRepo::lock(uow.conn(), switch.id, plan.port_no).await?;

    // Payload wins, otherwise keep what is stored
    let mut port_write = match &existing_port {
        Some(p) => PortWrite::from_port(p),
        None => PortWrite {
            link_type: link_type::EMPTY.to_string(),
            device: String::new(),
            ip: String::new(),
            mac: String::new(),
            connected_panel_id: None,
            connected_panel_port: None,
            connected_to: None,
            connection_info: String::new(),
        },
    };
    if let Some(v) = &plan.link_type {
        port_write.link_type = v.clone();
    }
    if let Some(v) = &plan.device {
        port_write.device = v.clone();
    }
    if let Some(v) = &plan.ip {
        port_write.ip = v.clone();
    }
    if let Some(v) = &plan.mac {
        port_write.mac = v.clone();
    }
    if let Some(v) = &plan.connection_info {
        port_write.connection_info = v.clone();
    }
    if let Some((r, panel)) = &panel {
        port_write.connected_panel_id = Some(r.panel_id);
        port_write.connected_panel_port = Some(r.port_number);
        port_write.connected_to = Some(format!(
            "{}-{}{}",
            switch.rack_name.as_deref().unwrap_or_default(),
            panel.panel_letter,
            r.port_number
        ));
    }

    let port_version = match &existing_port {
        Some(p) => PortRepo::update_guarded(uow.conn(), p.id, p.sync_version, &port_write).await?,
        None => {
            PortRepo::insert(uow.conn(), switch.id, plan.port_no, &port_write).await?;
            1
        }
    };

    let mut old_panel_port = None;
    let mut new_panel_port = None;
    let mut link = None;
    if let Some((r, _)) = &panel {
        let existing = PanelPortRepo::lock(uow.conn(), r.family, r.panel_id, r.port_number).await?;

        let write = PanelPortWrite {
            status: panel_port_status::ACTIVE.to_string(),
            connected_to: Some(format!("{}-Port{}", switch.name, plan.port_no)),
            connected_switch_id: Some(switch.id),
            connected_switch_port: Some(plan.port_no),
            connection_type: r.family.is_fiber().then(|| SWITCH_FIBER_MEDIUM.to_string()),
            connection_details: Some(json!({
                "switch_id": switch.id,
                "switch_name": switch.name,
                "switch_port": plan.port_no,
                "device": port_write.device,
                "ip": port_write.ip,
                "mac": port_write.mac,
                "synced_at": chrono::Utc::now().to_rfc3339(),
                "synced_by": plan.actor,
            })),
        };

        let version = match &existing {
            Some(pp) => {
                PanelPortRepo::update_guarded(uow.conn(), r.family, pp.id, pp.sync_version, &write).await?
            }
            None => {
                PanelPortRepo::insert(uow.conn(), r.family, r.panel_id, r.port_number, &write).await?;
                1
            }
        };

        old_panel_port = existing.as_ref().map(snapshots::stored_panel_port);
        new_panel_port = Some(snapshots::panel_port(r.panel_id, r.port_number, &write, version));
        link = Some(PanelLink {
            panel_type: r.family,
            panel_id: r.panel_id,
            panel_port: r.port_number,
            version,
        });
    }

    let action = if existing_port.is_some() || old_panel_port.is_some() {
        HistoryAction::Updated
    } else {
        HistoryAction::Created
    };

    let entry = NewHistoryEntry {
        user_name: plan.actor.clone(),
        connection_type: plan
            .panel
            .map(|r| r.family.connection_type())
            .unwrap_or(CONNECTION_TYPE_NONE)
            .to_string(),
        source_type: endpoint_type::SWITCH.to_string(),
        source_id: switch.id,
        source_port: plan.port_no,
        target_type: plan
            .panel
            .map(|r| r.family.endpoint_type())
            .unwrap_or(endpoint_type::NONE)
            .to_string(),
        target_id: plan.panel.map(|r| r.panel_id),
        target_port: plan.panel.map(|r| r.port_number),
        action,
        old_values: json!({
            "port": existing_port
                .as_ref()
                .map(|p| snapshots::port(&PortWrite::from_port(p), p.sync_version)),
            "panel_port": old_panel_port,
        }),
        new_values: json!({
            "port": snapshots::port(&port_write, port_version),
            "panel_port": new_panel_port,
        }),
    };
    let history_id = HistoryRepo::append(uow.conn(), &entry).await?;

    Ok(SyncOutcome {
        success: true,
        switch_id: switch.id,
        port: plan.port_no,
        port_version,
        panel: link,
        action,
        history_id,
    })
}

fn check_panel_binding(
    switch: &Switch,
    port_no: i64,
    fiber_port: bool,
    r: &PanelRef,
    panel: &Panel,
) -> Result<(), SyncError> {
    if switch.rack_id != Some(panel.rack_id) {
        return Err(SyncError::validation(format!(
            "{} panel {} is not in the same rack as switch {}",
            r.family, r.panel_id, switch.name
        )));
    }
    match (r.family, fiber_port) {
        (PanelFamily::Patch, true) => Err(SyncError::validation(format!(
            "Patch panel cannot connect to fiber port {}",
            port_no
        ))),
        (PanelFamily::Fiber, false) => Err(SyncError::validation(format!(
            "Fiber panel requires a fiber port (the last {} ports of {})",
            FIBER_PORT_COUNT, switch.name
        ))),
        _ => Ok(()),
    }
}

/// One attempt of a panel port disconnect. Must run inside an open transaction on `uow`.
pub async fn apply_disconnect(
    uow: &mut UnitOfWork,
    plan: &DisconnectPlan,
) -> Result<DisconnectOutcome, SyncError> {
    let not_found = || {
        SyncError::validation(format!(
            "{} panel {} port {} not found",
            plan.family, plan.panel_id, plan.port_number
        ))
    };

    // The switch side is only known from the panel port, so peek at it before
    // taking the reads in lock order.
    let peek = PanelPortRepo::find(uow.conn(), plan.family, plan.panel_id, plan.port_number)
        .await?
        .ok_or_else(not_found)?;
    let linked = peek.connected_switch_id.zip(peek.connected_switch_port);

    let switch = match linked {
        Some((switch_id, _)) => SwitchRepo::find(uow.conn(), switch_id).await?,
        None => None,
    };
    PanelRepo::lock(uow.conn(), plan.family, plan.panel_id)
        .await?
        .ok_or_else(|| {
            SyncError::validation(format!("{} panel {} not found", plan.family, plan.panel_id))
        })?;
    let port = match (&switch, linked) {
        (Some(sw), Some((_, switch_port))) => PortRepo::lock(uow.conn(), sw.id, switch_port).await?,
        _ => None,
    };
    let panel_port = PanelPortRepo::lock(uow.conn(), plan.family, plan.panel_id, plan.port_number)
        .await?
        .ok_or_else(not_found)?;

    let cleared = PanelPortWrite::cleared();
    let panel_version = PanelPortRepo::update_guarded(
        uow.conn(),
        plan.family,
        panel_port.id,
        panel_port.sync_version,
        &cleared,
    )
    .await?;

    // Only unlink the switch port if it still points back at this panel port
    let back_linked = port.filter(|p| {
        p.connected_panel_id == Some(plan.panel_id)
            && p.connected_panel_port == Some(plan.port_number)
            && switch
                .as_ref()
                .map(|sw| sw.is_fiber_port(p.port_no) == plan.family.is_fiber())
                .unwrap_or(false)
    });
    let mut old_port = None;
    let mut new_port = None;
    if let Some(p) = &back_linked {
        let mut write = PortWrite::from_port(p);
        write.connected_panel_id = None;
        write.connected_panel_port = None;
        write.connected_to = None;
        let version = PortRepo::update_guarded(uow.conn(), p.id, p.sync_version, &write).await?;
        old_port = Some(snapshots::port(&PortWrite::from_port(p), p.sync_version));
        new_port = Some(snapshots::port(&write, version));
    }

    let entry = NewHistoryEntry {
        user_name: plan.actor.clone(),
        connection_type: plan.family.connection_type().to_string(),
        source_type: plan.family.endpoint_type().to_string(),
        source_id: plan.panel_id,
        source_port: plan.port_number,
        target_type: if linked.is_some() {
            endpoint_type::SWITCH
        } else {
            endpoint_type::NONE
        }
        .to_string(),
        target_id: linked.map(|(id, _)| id),
        target_port: linked.map(|(_, port)| port),
        action: HistoryAction::Deleted,
        old_values: json!({
            "panel_port": snapshots::stored_panel_port(&panel_port),
            "port": old_port,
        }),
        new_values: json!({
            "panel_port": snapshots::panel_port(plan.panel_id, plan.port_number, &cleared, panel_version),
            "port": new_port,
        }),
    };
    let history_id = HistoryRepo::append(uow.conn(), &entry).await?;

    Ok(DisconnectOutcome {
        success: true,
        panel_type: plan.family,
        panel_id: plan.panel_id,
        port_number: plan.port_number,
        disconnected_switch_id: linked.map(|(id, _)| id),
        disconnected_switch_port: linked.map(|(_, port)| port),
        history_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{seed_panel, seed_switch, table_counts, test_store};
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        }
    }

    fn service(store: &Store) -> Arc<PortPanelSync> {
        PortPanelSync::new(store.clone(), fast_policy(), "system")
    }

    fn panel_request(switch_id: i64, port: i64, family: &str, panel_id: i64, panel_port: i64) -> SyncPortRequest {
        SyncPortRequest {
            switch_id,
            port,
            panel_id: Some(panel_id),
            panel_port: Some(panel_port),
            panel_type: Some(family.into()),
            actor: "alice".into(),
            ..Default::default()
        }
    }

    async fn port_row(store: &Store, switch_id: i64, port_no: i64) -> Port {
        PortRepo::find(store.pool(), switch_id, port_no).await.unwrap().unwrap()
    }

    async fn history(store: &Store) -> Vec<ConnectionHistory> {
        HistoryRepo::list(store.pool(), &HistoryQuery::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_fiber_port_to_fiber_panel_end_to_end() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, f1) = seed_panel(&store, "R1", PanelFamily::Fiber, "F").await;

        let req = SyncPortRequest {
            device: Some("Camera-12".into()),
            ip: Some("10.0.0.12".into()),
            ..panel_request(sw, 22, "fiber", f1, 3)
        };
        let outcome = service(&store).sync_port(&req).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.action, HistoryAction::Created);
        assert_eq!(outcome.port_version, 1);

        let port = port_row(&store, sw, 22).await;
        assert_eq!(port.connected_panel_id, Some(f1));
        assert_eq!(port.connected_panel_port, Some(3));
        assert_eq!(port.device, "Camera-12");
        assert_eq!(port.ip, "10.0.0.12");
        assert_eq!(port.link_type, link_type::EMPTY);
        assert_eq!(port.connected_to.as_deref(), Some("R1-F3"));

        let fp = PanelPortRepo::find(store.pool(), PanelFamily::Fiber, f1, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fp.status, panel_port_status::ACTIVE);
        assert_eq!(fp.connected_switch_id, Some(sw));
        assert_eq!(fp.connected_switch_port, Some(22));
        assert_eq!(fp.connected_to.as_deref(), Some("SW-01-Port22"));
        assert_eq!(fp.connection_type.as_deref(), Some(SWITCH_FIBER_MEDIUM));
        let details = fp.connection_details.unwrap();
        assert_eq!(details["switch_name"], "SW-01");
        assert_eq!(details["device"], "Camera-12");
        assert_eq!(details["synced_by"], "alice");

        let rows = history(&store).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "created");
        assert_eq!(rows[0].user_name, "alice");
        assert_eq!(rows[0].connection_type, "switch_to_fiber");
        assert_eq!(rows[0].source_type, "switch");
        assert_eq!((rows[0].source_id, rows[0].source_port), (sw, 22));
        assert_eq!(rows[0].target_type, "fiber_panel");
        assert_eq!((rows[0].target_id, rows[0].target_port), (Some(f1), Some(3)));
        assert_eq!(rows[0].old_values, json!({"port": null, "panel_port": null}));
        assert_eq!(rows[0].new_values["port"]["device"], "Camera-12");
        assert_eq!(rows[0].new_values["panel_port"]["connected_switch_port"], 22);
    }

    #[tokio::test]
    async fn test_copper_port_to_patch_panel() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;

        let req = SyncPortRequest {
            link_type: Some("ethernet".into()),
            device: Some(" PC-7 ".into()),
            ..panel_request(sw, 7, "patch", pa, 12)
        };
        service(&store).sync_port(&req).await.unwrap();

        let port = port_row(&store, sw, 7).await;
        assert_eq!(port.link_type, link_type::ETHERNET);
        assert_eq!(port.device, "PC-7");
        assert_eq!(port.connected_to.as_deref(), Some("R1-A12"));

        let pp = PanelPortRepo::find(store.pool(), PanelFamily::Patch, pa, 12)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pp.connected_switch_id, Some(sw));
        assert_eq!(pp.connected_switch_port, Some(7));
        assert_eq!(pp.connection_type, None);
        assert_eq!(history(&store).await[0].connection_type, "switch_to_patch");
    }

    #[tokio::test]
    async fn test_classification_guard_writes_nothing() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let (_, f1) = seed_panel(&store, "R1", PanelFamily::Fiber, "F").await;
        let svc = service(&store);

        let err = svc.sync_port(&panel_request(sw, 23, "patch", pa, 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = svc.sync_port(&panel_request(sw, 5, "fiber", f1, 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(table_counts(&store).await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_cross_rack_guard_writes_nothing() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, other) = seed_panel(&store, "R2", PanelFamily::Patch, "A").await;

        let err = service(&store)
            .sync_port(&panel_request(sw, 3, "patch", other, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("same rack"));
        assert_eq!(table_counts(&store).await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_malformed_requests_are_rejected() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let svc = service(&store);

        let cases = vec![
            SyncPortRequest { switch_id: 0, port: 1, ..Default::default() },
            SyncPortRequest { switch_id: sw, port: -2, ..Default::default() },
            SyncPortRequest { switch_id: 9999, port: 1, ..Default::default() },
            SyncPortRequest { panel_type: Some("copper".into()), ..panel_request(sw, 3, "patch", pa, 1) },
            SyncPortRequest { panel_type: None, ..panel_request(sw, 3, "patch", pa, 1) },
            SyncPortRequest { panel_port: None, ..panel_request(sw, 3, "patch", pa, 1) },
            SyncPortRequest { panel_id: Some(-1), ..panel_request(sw, 3, "patch", pa, 1) },
            panel_request(sw, 3, "patch", 4242, 1),
            // Panel ids of one family do not resolve in the other
            panel_request(sw, 22, "fiber", pa, 1),
        ];
        for req in cases {
            let err = svc.sync_port(&req).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "request {:?} gave {:?}", req, err);
        }
        assert_eq!(table_counts(&store).await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_second_sync_updates_and_keeps_omitted_fields() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let svc = service(&store);

        let first = SyncPortRequest {
            link_type: Some("DEVICE".into()),
            device: Some("Printer".into()),
            mac: Some("aa:bb:cc:dd:ee:ff".into()),
            connection_info: Some("floor 2".into()),
            ..panel_request(sw, 4, "patch", pa, 9)
        };
        svc.sync_port(&first).await.unwrap();

        let second = SyncPortRequest {
            switch_id: sw,
            port: 4,
            ip: Some("10.1.1.4".into()),
            ..Default::default()
        };
        let outcome = svc.sync_port(&second).await.unwrap();
        assert_eq!(outcome.action, HistoryAction::Updated);
        assert_eq!(outcome.port_version, 2);
        assert!(outcome.panel.is_none());

        let port = port_row(&store, sw, 4).await;
        assert_eq!(port.sync_version, 2);
        assert_eq!(port.link_type, "DEVICE");
        assert_eq!(port.device, "Printer");
        assert_eq!(port.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(port.ip, "10.1.1.4");
        assert_eq!(port.connection_info, "floor 2");
        assert_eq!(port.connected_panel_id, Some(pa));
        assert_eq!(port.connected_panel_port, Some(9));

        let rows = history(&store).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, "updated");
        assert_eq!(rows[0].connection_type, "none");
        assert_eq!(rows[0].target_type, "none");
        assert_eq!(rows[0].target_id, None);
        assert_eq!(rows[0].old_values["port"]["sync_version"], 1);
        assert_eq!(rows[0].new_values["port"]["sync_version"], 2);
    }

    #[tokio::test]
    async fn test_repeated_panel_sync_bumps_panel_port_version() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let svc = service(&store);

        svc.sync_port(&panel_request(sw, 2, "patch", pa, 2)).await.unwrap();
        let outcome = svc.sync_port(&panel_request(sw, 2, "patch", pa, 2)).await.unwrap();

        assert_eq!(outcome.port_version, 2);
        assert_eq!(outcome.panel.as_ref().map(|l| l.version), Some(2));
        let rows = history(&store).await;
        assert_eq!(rows[0].old_values["panel_port"]["sync_version"], 1);
    }

    #[tokio::test]
    async fn test_clearing_twice_is_idempotent_but_audited_twice() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let svc = service(&store);

        let clear = SyncPortRequest {
            switch_id: sw,
            port: 10,
            link_type: Some(String::new()),
            device: Some(String::new()),
            ip: Some(String::new()),
            mac: Some(String::new()),
            ..Default::default()
        };
        svc.sync_port(&clear).await.unwrap();
        let after_first = port_row(&store, sw, 10).await;
        svc.sync_port(&clear).await.unwrap();
        let after_second = port_row(&store, sw, 10).await;

        assert_eq!(after_first.link_type, link_type::EMPTY);
        assert_eq!(
            PortWrite::from_port(&after_first),
            PortWrite::from_port(&after_second)
        );
        assert_eq!(after_second.sync_version, after_first.sync_version + 1);

        let rows = history(&store).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].action, "created");
        assert_eq!(rows[0].action, "updated");
        assert_eq!(rows[0].user_name, "system");
    }

    #[tokio::test]
    async fn test_transient_failure_retry_leaves_single_audit_row() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, f1) = seed_panel(&store, "R1", PanelFamily::Fiber, "F").await;
        let req = SyncPortRequest {
            device: Some("Camera-12".into()),
            ..panel_request(sw, 22, "fiber", f1, 3)
        };
        let plan = SyncPlan::from_request(&req, "system").unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let mut uow = store.unit_of_work().await.unwrap();
        let outcome = uow
            .run_with_retry(fast_policy(), |uow| {
                let plan = plan.clone();
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    let outcome = apply_port_sync(uow, &plan).await?;
                    if attempt == 1 {
                        return Err(SyncError::Transient("Lock wait timeout exceeded".into()));
                    }
                    Ok(outcome)
                })
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.action, HistoryAction::Created);
        assert_eq!(outcome.port_version, 1);
        assert_eq!(table_counts(&store).await, (1, 1, 1));

        let port = port_row(&store, sw, 22).await;
        assert_eq!(port.sync_version, 1);
        assert_eq!(port.connected_panel_id, Some(f1));
        let rows = history(&store).await;
        assert_eq!(rows[0].action, "created");
    }

    #[tokio::test]
    async fn test_lost_update_is_detected_and_retried() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let svc = service(&store);
        svc.sync_port(&SyncPortRequest { switch_id: sw, port: 1, ..Default::default() })
            .await
            .unwrap();

        let plan = SyncPlan::from_request(
            &SyncPortRequest {
                switch_id: sw,
                port: 1,
                device: Some("AP-3".into()),
                ..Default::default()
            },
            "system",
        )
        .unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let mut uow = store.unit_of_work().await.unwrap();
        let outcome = uow
            .run_with_retry(fast_policy(), |uow| {
                let plan = plan.clone();
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    if attempt == 1 {
                        // Another writer advances the version between our read and write
                        let seen = PortRepo::lock(uow.conn(), plan.switch_id, plan.port_no)
                            .await?
                            .expect("port exists");
                        sqlx::query("UPDATE ports SET sync_version = sync_version + 1 WHERE id = ?")
                            .bind(seen.id)
                            .execute(uow.conn())
                            .await?;
                        let write = PortWrite::from_port(&seen);
                        PortRepo::update_guarded(uow.conn(), seen.id, seen.sync_version, &write).await?;
                        unreachable!("stale write must conflict");
                    }
                    apply_port_sync(uow, &plan).await
                })
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.port_version, 2);
        let port = port_row(&store, sw, 1).await;
        assert_eq!(port.sync_version, 2);
        assert_eq!(port.device, "AP-3");
        assert_eq!(history(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_syncs_on_same_port_serialize_versions() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let svc = service(&store);
        svc.sync_port(&panel_request(sw, 8, "patch", pa, 8)).await.unwrap();

        let a = SyncPortRequest { device: Some("left".into()), ..panel_request(sw, 8, "patch", pa, 8) };
        let b = SyncPortRequest { device: Some("right".into()), ..panel_request(sw, 8, "patch", pa, 8) };
        let (ra, rb) = tokio::join!(svc.sync_port(&a), svc.sync_port(&b));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        let mut versions = vec![ra.port_version, rb.port_version];
        versions.sort();
        assert_eq!(versions, vec![2, 3]);

        let port = port_row(&store, sw, 8).await;
        assert_eq!(port.sync_version, 3);
        let pp = PanelPortRepo::find(store.pool(), PanelFamily::Patch, pa, 8)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pp.sync_version, 3);

        // No two writers applied on top of the same starting version
        let rows = history(&store).await;
        assert_eq!(rows.len(), 3);
        let mut starts: Vec<i64> = rows[..2]
            .iter()
            .map(|r| r.old_values["port"]["sync_version"].as_i64().unwrap())
            .collect();
        starts.sort();
        assert_eq!(starts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_lock_timeout_exhausts_retries_without_writes() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let impatient = Store::with_options(store.db_path(), 2, Duration::from_millis(20))
            .await
            .unwrap();
        let svc = PortPanelSync::new(
            impatient,
            RetryPolicy { max_attempts: 2, initial_delay: Duration::from_millis(1) },
            "system",
        );

        let mut holder = store.unit_of_work().await.unwrap();
        holder.begin().await.unwrap();

        let err = svc
            .sync_port(&SyncPortRequest { switch_id: sw, port: 1, ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalStore);
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 2, .. }));

        holder.rollback().await.unwrap();
        assert_eq!(table_counts(&store).await, (0, 0, 0));
    }

    #[tokio::test]
    async fn test_disconnect_clears_both_sides() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, f1) = seed_panel(&store, "R1", PanelFamily::Fiber, "F").await;
        let svc = service(&store);
        svc.sync_port(&SyncPortRequest {
            device: Some("Camera-12".into()),
            ..panel_request(sw, 22, "fiber", f1, 3)
        })
        .await
        .unwrap();

        let outcome = svc
            .disconnect_panel_port(&DisconnectPanelPortRequest {
                panel_type: "fiber".into(),
                panel_id: f1,
                port_number: 3,
                actor: "bob".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.disconnected_switch_id, Some(sw));
        assert_eq!(outcome.disconnected_switch_port, Some(22));

        let fp = PanelPortRepo::find(store.pool(), PanelFamily::Fiber, f1, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fp.status, panel_port_status::INACTIVE);
        assert_eq!(fp.connected_switch_id, None);
        assert_eq!(fp.connection_type, None);
        assert_eq!(fp.connection_details, None);
        assert_eq!(fp.sync_version, 2);

        let port = port_row(&store, sw, 22).await;
        assert_eq!(port.connected_panel_id, None);
        assert_eq!(port.connected_panel_port, None);
        assert_eq!(port.connected_to, None);
        assert_eq!(port.device, "Camera-12");
        assert_eq!(port.sync_version, 2);

        let rows = history(&store).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, "deleted");
        assert_eq!(rows[0].user_name, "bob");
        assert_eq!(rows[0].source_type, "fiber_panel");
        assert_eq!((rows[0].source_id, rows[0].source_port), (f1, 3));
        assert_eq!(rows[0].target_type, "switch");
        assert_eq!((rows[0].target_id, rows[0].target_port), (Some(sw), Some(22)));
        assert_eq!(rows[0].old_values["panel_port"]["connected_switch_port"], 22);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_relinked_switch_port_alone() {
        let (_dir, store) = test_store().await;
        let (_, sw) = seed_switch(&store, "R1", "SW-01", 24).await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let svc = service(&store);
        svc.sync_port(&panel_request(sw, 5, "patch", pa, 1)).await.unwrap();
        // Port 5 is re-cabled to panel port 2; panel port 1 still names it
        svc.sync_port(&panel_request(sw, 5, "patch", pa, 2)).await.unwrap();

        svc.disconnect_panel_port(&DisconnectPanelPortRequest {
            panel_type: "patch".into(),
            panel_id: pa,
            port_number: 1,
            actor: String::new(),
        })
        .await
        .unwrap();

        let port = port_row(&store, sw, 5).await;
        assert_eq!(port.connected_panel_port, Some(2));
        assert_eq!(port.sync_version, 2);
        let rows = history(&store).await;
        assert_eq!(rows[0].old_values["port"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_disconnect_validation() {
        let (_dir, store) = test_store().await;
        let (_, pa) = seed_panel(&store, "R1", PanelFamily::Patch, "A").await;
        let svc = service(&store);

        let cases = vec![
            DisconnectPanelPortRequest { panel_type: "patch".into(), panel_id: 0, port_number: 1, actor: String::new() },
            DisconnectPanelPortRequest { panel_type: "copper".into(), panel_id: pa, port_number: 1, actor: String::new() },
            // Port row was never created
            DisconnectPanelPortRequest { panel_type: "patch".into(), panel_id: pa, port_number: 1, actor: String::new() },
        ];
        for req in cases {
            let err = svc.disconnect_panel_port(&req).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "request {:?}", req);
        }
        assert_eq!(table_counts(&store).await, (0, 0, 0));
    }
}
