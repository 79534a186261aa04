// End-to-end run of the averaging application: naming service, published
// daemon and a client stepping through a small simulation.

use average_server::{AverageApplication, AverageClient, Property, PropertyId, TimeStep, SIGNATURE};
use mupif_client::{connect_app, connect_name_server, ns_app_name};
use mupif_common::protocol::error::MupifError;
use mupif_common::AuthConfig;
use mupif_naming::RunningNameServer;
use mupif_server::{start_app_server, AppServerConfig, DaemonConfig};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_average_application_round_trip() {
    let auth = AuthConfig::with_hmac_key("mupif-secret-key");
    let ns = RunningNameServer::spawn("127.0.0.1:0", auth.clone()).await.unwrap();
    let ns_port = ns.local_addr().port();

    tokio::task::spawn_blocking(move || {
        let name = ns_app_name("job1", "app2");
        let config = AppServerConfig::new(DaemonConfig::new("127.0.0.1", 0), "127.0.0.1", name.clone())
            .with_ns_port(ns_port)
            .with_ns_timeout(Duration::from_secs(2))
            .with_auth(auth.clone());
        let server = start_app_server(&config, AverageApplication::new()).unwrap();
        std::thread::spawn(move || {
            server.request_loop();
        });

        let ns_proxy = connect_name_server("127.0.0.1", ns_port, &auth, Duration::from_secs(2)).unwrap();
        let proxy = connect_app(&ns_proxy, &name).expect("application should be published");
        assert_eq!(proxy.get_application_signature().unwrap(), SIGNATURE);
        let app = AverageClient::new(proxy);

        let err = app.get_property(PropertyId::CumulativeConcentration, 0.0).unwrap_err();
        assert!(matches!(err, MupifError::Remote(_)), "{}", err);

        let dt = app.critical_time_step().unwrap();
        assert_eq!(dt, 1.0);
        for (number, concentration) in [1.0, 2.0, 6.0].into_iter().enumerate() {
            let time = number as f64 * dt;
            app.set_property(&Property::scalar(concentration, PropertyId::Concentration, time))
                .unwrap();
            app.solve_step(&TimeStep {
                number: number as u64,
                time,
                dt,
            })
            .unwrap();
        }

        let average = app.get_property(PropertyId::CumulativeConcentration, 3.0).unwrap();
        assert_eq!(average.value, 3.0);
        assert_eq!(average.property_id, PropertyId::CumulativeConcentration);

        let err = app
            .set_property(&Property::scalar(1.0, PropertyId::CumulativeConcentration, 3.0))
            .unwrap_err();
        assert!(matches!(err, MupifError::Remote(ref m) if m == "Unknown property ID"), "{}", err);
    })
    .await
    .unwrap();

    ns.shutdown();
}
