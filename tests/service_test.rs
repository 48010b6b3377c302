#[cfg(feature = "service")]
mod service_tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;
    use tower::ServiceExt;
    use traffic_rs::service::TrafficService;
    use traffic_rs::{
        AnomalyDetector, Batch, BatchStore, MemoryStore, QueryService, TrafficRow,
    };

    fn hour() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn row(subscriber_id: u64, up: f64) -> TrafficRow {
        TrafficRow {
            subscriber_id,
            up_bytes: up,
            down_bytes: 1000.0,
            hour_window_start: hour(),
            sub_window_start: hour(),
            node_id: 7,
        }
    }

    async fn create_test_service(threshold: f64) -> (TrafficService, Arc<MemoryStore>) {
        let inner = Arc::new(MemoryStore::new());
        let store = BatchStore::new(inner.clone());
        let mut rows: Vec<TrafficRow> = [100.0, 100.0, 100.0, 100.0, 100.0, 900.0]
            .iter()
            .map(|up| row(42, *up))
            .collect();
        rows.push(row(43, 10.0));
        store
            .put(&Batch {
                node_id: 7,
                hour_window_start: hour(),
                rows,
            })
            .await
            .unwrap();

        let queries = QueryService::new(store, AnomalyDetector::new(threshold));
        (TrafficService::new(Arc::new(queries)), inner)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (service, _) = create_test_service(3.0).await;
        let (status, body) = get(service.router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Telecom Traffic Analysis API");
    }

    #[tokio::test]
    async fn test_anomalies_endpoint() {
        let (service, _) = create_test_service(1.0).await;
        let (status, body) = get(service.router(), "/api/anomalies").await;
        assert_eq!(status, StatusCode::OK);

        let anomalies = body.as_array().unwrap();
        assert_eq!(anomalies.len(), 1);
        let record = &anomalies[0];
        assert_eq!(record["IdSubscriber"], 42);
        assert_eq!(record["UpTx"], 900.0);
        assert_eq!(record["IdPSX"], 7);
        assert_eq!(record["Start1hPeriod"], "2024-01-01T00:00:00");
        assert_eq!(record["Start10mPeriod"], 1_704_067_200_000i64);
        assert_eq!(record["is_anomaly"], true);
        assert!(record["UpTx_mean"].is_number());
        assert!(record["DownTx_std"].is_number());
    }

    #[tokio::test]
    async fn test_default_threshold_finds_nothing() {
        let (service, _) = create_test_service(3.0).await;
        let (status, body) = get(service.router(), "/api/anomalies").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_subscriber_endpoint() {
        let (service, _) = create_test_service(3.0).await;
        let app = service.router();

        let (status, body) = get(app.clone(), "/api/subscriber/42").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r["Start1hPeriod"] == "2024-01-01T00:00:00"));

        let (status, body) = get(app, "/api/subscriber/999").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_statistics_endpoint() {
        let (service, _) = create_test_service(3.0).await;
        let (status, body) = get(service.router(), "/api/statistics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_subscribers"], 2);
        assert_eq!(body["total_records"], 7);
        assert_eq!(body["anomalies_count"], 0);
        assert_eq!(body["time_range"]["start"], "2024-01-01 00:00:00");
        assert_eq!(body["time_range"]["end"], "2024-01-01 00:00:00");
    }

    #[tokio::test]
    async fn test_outage_returns_detail() {
        let (service, store) = create_test_service(3.0).await;
        store.set_available(false);
        let app = service.router();

        for uri in ["/api/anomalies", "/api/subscriber/42", "/api/statistics"] {
            let (status, body) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
            assert!(body["detail"].as_str().unwrap().contains("unavailable"));
        }

        // health does not touch the store
        let (status, _) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }
}
