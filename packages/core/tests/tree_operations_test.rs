//! Tree Operation Tests
//!
//! Structural properties of the engine against a real libsql database: reversibility
//! of operations, cycle rejection, repair of corrupted scopes, rebuilds from a forest,
//! concurrent writers and event emission.

#[cfg(test)]
mod tree_operation_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use nestedset_core::config::TreeTableConfig;
    use nestedset_core::db::{
        DatabaseError, LibsqlStore, NewRow, RecordStore, ScopedQuery, StoreTransaction,
    };
    use nestedset_core::interval::{BoundaryPlan, Interval};
    use nestedset_core::models::{ForestEntry, Node, NodeDraft, NodeId, ScopeKey};
    use nestedset_core::services::{MovePosition, NestedSetError, NestedSetService, TreeEvent};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    fn menu(id: i64) -> ScopeKey {
        ScopeKey::new().with("menu_id", id)
    }

    fn menu_config() -> TreeTableConfig {
        TreeTableConfig::scoped("menu_items", ["menu_id"])
    }

    /// Helper returning the raw store too, for tests that corrupt rows directly
    async fn create_test_service(
        config: TreeTableConfig,
    ) -> Result<(NestedSetService, LibsqlStore, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("tree.db");
        let store = LibsqlStore::new(db_path, config.clone()).await?;
        let service = NestedSetService::new(Arc::new(store.clone()), &config)?;
        Ok((service, store, temp_dir))
    }

    /// menu 1: 1 [1,2], 2 [3,6] > 5 [4,5]; menu 2: 3 [1,2], 4 [3,6] > 6 [4,5]
    async fn seed_menus(service: &NestedSetService) -> Result<()> {
        for menu_id in [1, 1, 2, 2] {
            service
                .create_root(NodeDraft::in_scope(menu(menu_id), json!({})))
                .await?;
        }
        service
            .append_child(NodeId(2), NodeDraft::new(json!({})))
            .await?;
        service
            .append_child(NodeId(4), NodeDraft::new(json!({})))
            .await?;
        Ok(())
    }

    async fn snapshot(
        service: &NestedSetService,
        scope: &ScopeKey,
    ) -> Result<Vec<(i64, i64, i64, Option<i64>)>> {
        Ok(service
            .fetch(&service.scoped(scope)?)
            .await?
            .into_iter()
            .map(|n| (n.id.0, n.lft, n.rgt, n.parent_id.map(|p| p.0)))
            .collect())
    }

    /// Store whose transactions reject every insert, after earlier writes went through
    struct RejectingInsertStore {
        inner: LibsqlStore,
    }

    struct RejectingInsertTransaction {
        inner: Box<dyn StoreTransaction>,
    }

    #[async_trait]
    impl RecordStore for RejectingInsertStore {
        async fn get_node(&self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
            self.inner.get_node(id).await
        }

        async fn fetch_nodes(&self, query: &ScopedQuery) -> Result<Vec<Node>, DatabaseError> {
            self.inner.fetch_nodes(query).await
        }

        async fn list_scopes(&self) -> Result<Vec<ScopeKey>, DatabaseError> {
            self.inner.list_scopes().await
        }

        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DatabaseError> {
            Ok(Box::new(RejectingInsertTransaction {
                inner: self.inner.begin().await?,
            }))
        }
    }

    #[async_trait]
    impl StoreTransaction for RejectingInsertTransaction {
        async fn get_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
            self.inner.get_node(id).await
        }

        async fn fetch_nodes(&mut self, query: &ScopedQuery) -> Result<Vec<Node>, DatabaseError> {
            self.inner.fetch_nodes(query).await
        }

        async fn max_rgt(&mut self, scope: &ScopeKey) -> Result<Option<i64>, DatabaseError> {
            self.inner.max_rgt(scope).await
        }

        async fn shift_boundaries(
            &mut self,
            scope: &ScopeKey,
            plan: &BoundaryPlan,
        ) -> Result<u64, DatabaseError> {
            self.inner.shift_boundaries(scope, plan).await
        }

        async fn insert_node(&mut self, _row: NewRow<'_>) -> Result<NodeId, DatabaseError> {
            Err(DatabaseError::sql_execution("insert rejected"))
        }

        async fn set_parent(
            &mut self,
            id: NodeId,
            parent: Option<NodeId>,
        ) -> Result<(), DatabaseError> {
            self.inner.set_parent(id, parent).await
        }

        async fn set_position(
            &mut self,
            id: NodeId,
            interval: Interval,
            parent: Option<NodeId>,
        ) -> Result<(), DatabaseError> {
            self.inner.set_position(id, interval, parent).await
        }

        async fn set_payload(&mut self, id: NodeId, payload: &Value) -> Result<(), DatabaseError> {
            self.inner.set_payload(id, payload).await
        }

        async fn delete_range(
            &mut self,
            scope: &ScopeKey,
            range: Interval,
        ) -> Result<u64, DatabaseError> {
            self.inner.delete_range(scope, range).await
        }

        async fn delete_node(&mut self, id: NodeId) -> Result<u64, DatabaseError> {
            self.inner.delete_node(id).await
        }

        async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
            let this = *self;
            this.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
            let this = *self;
            this.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn test_append_then_delete_restores_layout() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let before = snapshot(&service, &menu(1)).await?;

        let child = service
            .append_child(NodeId(5), NodeDraft::new(json!({ "title": "Leaf" })))
            .await?;
        assert_eq!((child.lft, child.rgt), (5, 6));
        assert_eq!(service.depth(&child).await?, 2);

        assert_eq!(service.delete(child.id).await?, 1);
        assert_eq!(snapshot(&service, &menu(1)).await?, before);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_and_move_back() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let before = snapshot(&service, &menu(1)).await?;

        let moved = service
            .move_node(NodeId(5), NodeId(1), MovePosition::After)
            .await?;
        assert_eq!((moved.lft, moved.rgt), (3, 4));
        assert!(moved.is_root());
        assert_eq!(
            snapshot(&service, &menu(1)).await?,
            vec![(1, 1, 2, None), (5, 3, 4, None), (2, 5, 6, None)]
        );

        service
            .move_node(NodeId(5), NodeId(2), MovePosition::LastChildOf)
            .await?;
        assert_eq!(snapshot(&service, &menu(1)).await?, before);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_subtree_forward_and_back() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let before = snapshot(&service, &menu(1)).await?;

        // whole subtree of 2 becomes first child of 1
        service
            .move_node(NodeId(2), NodeId(1), MovePosition::FirstChildOf)
            .await?;
        assert_eq!(
            snapshot(&service, &menu(1)).await?,
            vec![(1, 1, 6, None), (2, 2, 5, Some(1)), (5, 3, 4, Some(2))]
        );

        service
            .move_node(NodeId(2), NodeId(1), MovePosition::After)
            .await?;
        assert_eq!(snapshot(&service, &menu(1)).await?, before);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_is_cycle() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let before = snapshot(&service, &menu(1)).await?;

        for position in [
            MovePosition::LastChildOf,
            MovePosition::FirstChildOf,
            MovePosition::Before,
            MovePosition::After,
        ] {
            let err = service
                .move_node(NodeId(2), NodeId(5), position)
                .await
                .unwrap_err();
            assert!(matches!(err, NestedSetError::Cycle { .. }), "{:?}", position);
        }

        let err = service
            .append_child(NodeId(2), NodeId(2))
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::InvalidOperation(_)));

        assert_eq!(snapshot(&service, &menu(1)).await?, before);

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_reference_is_not_found() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        let err = service
            .append_child(NodeId(999), NodeDraft::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::NotFound { id } if id == NodeId(999)));

        let err = service
            .move_node(NodeId(999), NodeId(1), MovePosition::After)
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::NotFound { .. }));

        assert!(matches!(
            service.delete(NodeId(999)).await.unwrap_err(),
            NestedSetError::NotFound { .. }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_after_shift_rolls_back() -> Result<()> {
        let (service, store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let menu_one = snapshot(&service, &menu(1)).await?;
        let menu_two = snapshot(&service, &menu(2)).await?;

        let failing = NestedSetService::new(
            Arc::new(RejectingInsertStore {
                inner: store.clone(),
            }),
            &menu_config(),
        )?;
        let mut rx = failing.subscribe();

        // the +2 gap is opened before the insert fails
        let err = failing
            .append_child(NodeId(1), NodeDraft::new(json!({ "title": "News" })))
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::Database(_)), "{}", err);

        let err = failing
            .insert_before(NodeId(5), NodeDraft::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::Database(_)), "{}", err);

        let root = service.get(NodeId(1)).await?;
        assert_eq!((root.lft, root.rgt), (1, 2));
        assert_eq!(snapshot(&service, &menu(1)).await?, menu_one);
        assert_eq!(snapshot(&service, &menu(2)).await?, menu_two);
        assert!(!service.is_broken(&menu(1)).await?);
        assert!(rx.try_recv().is_err());

        // the store is usable again once the failed transactions are gone
        let child = service
            .append_child(NodeId(1), NodeDraft::new(json!({ "title": "News" })))
            .await?;
        assert_eq!((child.lft, child.rgt), (2, 3));

        Ok(())
    }

    #[tokio::test]
    async fn test_prepend_child_and_up() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        let first = service
            .prepend_child(NodeId(2), NodeDraft::new(json!({ "title": "First" })))
            .await?;
        assert_eq!((first.lft, first.rgt), (4, 5));
        assert_eq!(
            service.get(NodeId(5)).await.map(|n| (n.lft, n.rgt))?,
            (6, 7)
        );

        assert!(service.up(NodeId(5)).await?);
        let children: Vec<i64> = service
            .children(&service.get(NodeId(2)).await?)
            .await?
            .into_iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(children, vec![5, first.id.0]);
        assert!(!service.up(NodeId(5)).await?);

        assert!(service.up(NodeId(2)).await?);
        assert_eq!(
            snapshot(&service, &menu(1)).await?[0],
            (2, 1, 6, None)
        );
        assert!(!service.is_broken(&menu(1)).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_fix_tree_repairs_corrupted_boundaries() -> Result<()> {
        let (service, store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let menu_two = snapshot(&service, &menu(2)).await?;

        let conn = store.connect_with_timeout().await?;
        conn.execute(
            "UPDATE menu_items SET lft = 10, rgt = 20 WHERE id = 5",
            (),
        )
        .await?;

        let report = service.count_errors(&menu(1)).await?;
        assert!(report.is_broken());
        assert!(report.gaps > 0);
        assert!(matches!(
            service.ensure_consistent(&menu(1)).await.unwrap_err(),
            NestedSetError::BrokenTree { .. }
        ));

        let summary = service.fix_tree(&menu(1)).await?;
        assert_eq!(summary.updated, 1);
        assert!(service.ensure_consistent(&menu(1)).await.is_ok());
        assert_eq!(
            snapshot(&service, &menu(1)).await?,
            vec![(1, 1, 2, None), (2, 3, 6, None), (5, 4, 5, Some(2))]
        );
        assert_eq!(snapshot(&service, &menu(2)).await?, menu_two);

        Ok(())
    }

    #[tokio::test]
    async fn test_fix_tree_promotes_orphans() -> Result<()> {
        let (service, store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        // parent pointer into the other menu
        let conn = store.connect_with_timeout().await?;
        conn.execute("UPDATE menu_items SET parent_id = 4 WHERE id = 5", ())
            .await?;

        let report = service.count_errors(&menu(1)).await?;
        assert_eq!(report.missing_parent, 1);

        service.fix_tree(&menu(1)).await?;
        assert_eq!(
            snapshot(&service, &menu(1)).await?,
            vec![(1, 1, 2, None), (2, 3, 4, None), (5, 5, 6, None)]
        );
        assert!(!service.is_broken(&menu(1)).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_rebuild_tree_from_forest() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let menu_two = snapshot(&service, &menu(2)).await?;

        let forest = vec![ForestEntry::existing(2).with_children(vec![
            ForestEntry::new(json!({ "title": "Team" })),
            ForestEntry {
                payload: Some(json!({ "title": "Home, renamed" })),
                ..ForestEntry::existing(1)
            },
        ])];

        let summary = service.rebuild_tree(&menu(1), &forest, false).await?;
        assert_eq!(summary.inserted.len(), 1);
        assert_eq!(summary.deleted, 0);

        let team = summary.inserted[0].0;
        // 5 was not mentioned: keeps parent 2, placed after the described children
        assert_eq!(
            snapshot(&service, &menu(1)).await?,
            vec![
                (2, 1, 8, None),
                (team, 2, 3, Some(2)),
                (1, 4, 5, Some(2)),
                (5, 6, 7, Some(2)),
            ]
        );
        assert_eq!(
            service.get(NodeId(1)).await?.attribute("title"),
            Some(&json!("Home, renamed"))
        );
        assert!(!service.is_broken(&menu(1)).await?);
        assert_eq!(snapshot(&service, &menu(2)).await?, menu_two);

        Ok(())
    }

    #[tokio::test]
    async fn test_rebuild_tree_keeps_unmentioned_rows_under_their_parent() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        // 5 (child of 2) is left out: it stays inside 2, ahead of the later root 1
        service
            .rebuild_tree(
                &menu(1),
                &[ForestEntry::existing(2), ForestEntry::existing(1)],
                false,
            )
            .await?;
        assert_eq!(
            snapshot(&service, &menu(1)).await?,
            vec![(2, 1, 4, None), (5, 2, 3, Some(2)), (1, 5, 6, None)]
        );

        // root 2 is left out: it follows the described forest, keeping its child
        service
            .rebuild_tree(
                &menu(1),
                &[ForestEntry::existing(1)
                    .with_children(vec![ForestEntry::new(json!({ "title": "Press" }))])],
                false,
            )
            .await?;
        let rows = snapshot(&service, &menu(1)).await?;
        assert_eq!(rows[0], (1, 1, 4, None));
        assert_eq!((rows[1].1, rows[1].2, rows[1].3), (2, 3, Some(1)));
        assert_eq!(&rows[2..], &[(2, 5, 8, None), (5, 6, 7, Some(2))]);
        assert!(!service.is_broken(&menu(1)).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_rebuild_tree_deletes_missing() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        let summary = service
            .rebuild_tree(&menu(1), &[ForestEntry::existing(1)], true)
            .await?;

        assert_eq!(summary.deleted, 2);
        assert_eq!(snapshot(&service, &menu(1)).await?, vec![(1, 1, 2, None)]);

        Ok(())
    }

    #[tokio::test]
    async fn test_rebuild_tree_rejects_foreign_and_unknown_ids() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let before = snapshot(&service, &menu(1)).await?;

        let err = service
            .rebuild_tree(&menu(1), &[ForestEntry::existing(3)], true)
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::ScopeViolation { .. }));

        let err = service
            .rebuild_tree(&menu(1), &[ForestEntry::existing(999)], true)
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::NotFound { .. }));

        assert_eq!(snapshot(&service, &menu(1)).await?, before);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_scopes_consistent() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        let mut handles = Vec::new();
        for i in 0..10 {
            for parent in [NodeId(1), NodeId(3)] {
                let service = service.clone();
                handles.push(tokio::spawn(async move {
                    service
                        .append_child(parent, NodeDraft::new(json!({ "n": i })))
                        .await
                }));
            }
        }
        for handle in handles {
            handle.await??;
        }

        for scope in [menu(1), menu(2)] {
            let report = service.count_errors(&scope).await?;
            assert!(!report.is_broken(), "{}: {}", scope, report);
        }
        assert_eq!(
            service.children(&service.get(NodeId(1)).await?).await?.len(),
            10
        );
        assert_eq!(
            service.children(&service.get(NodeId(3)).await?).await?.len(),
            10
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_events_follow_commits() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;
        let mut rx = service.subscribe();

        let child = service
            .append_child(NodeId(1), NodeDraft::new(json!({})))
            .await?;
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")?;
        assert_eq!(event, TreeEvent::NodeInserted { node: child });

        service.delete(NodeId(2)).await?;
        match rx.recv().await? {
            TreeEvent::SubtreeDeleted {
                root_id, removed, ..
            } => {
                assert_eq!(root_id, NodeId(2));
                assert_eq!(removed, 2);
            }
            other => panic!("Expected SubtreeDeleted event, got {:?}", other),
        }

        // Failed operations emit nothing
        let _ = service.append_child(NodeId(3), NodeId(1)).await;
        assert!(rx.try_recv().is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_unscoped_table_with_custom_offset() -> Result<()> {
        let config = TreeTableConfig {
            table: "categories".to_string(),
            boundary_offset: 0,
            ..Default::default()
        };
        let (service, _store, _temp_dir) = create_test_service(config).await?;

        let root = service
            .create_root(NodeDraft::in_scope(ScopeKey::new(), json!({ "name": "All" })))
            .await?;
        assert_eq!((root.lft, root.rgt), (0, 1));

        let child = service
            .append_child(root.id, NodeDraft::new(json!({ "name": "Books" })))
            .await?;
        assert_eq!((child.lft, child.rgt), (1, 2));

        assert_eq!(service.list_scopes().await?, vec![ScopeKey::new()]);
        assert!(!service.is_broken(&ScopeKey::new()).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_update_payload_keeps_boundaries() -> Result<()> {
        let (service, _store, _temp_dir) = create_test_service(menu_config()).await?;
        seed_menus(&service).await?;

        let node = service
            .update_payload(NodeId(5), json!({ "title": "People" }))
            .await?;
        assert_eq!((node.lft, node.rgt), (4, 5));
        assert_eq!(
            service.get(NodeId(5)).await?.payload,
            json!({ "title": "People" })
        );

        Ok(())
    }
}
