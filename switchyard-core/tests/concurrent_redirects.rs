//! Redirects computed concurrently against one shared target.

use std::sync::Arc;

use switchyard_core::{TargetBuilder, Url};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redirects_do_not_interfere() {
    let target = Arc::new(
        TargetBuilder::new("redirect", "https://$host/$path")
            .redirect_code(302)
            .strip_path("/old")
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..64 {
        let target = Arc::clone(&target);
        handles.push(tokio::spawn(async move {
            let host = format!("host{i}.example.com");
            let request = Url::from_request(&host, &format!("/old/page/{i}?n={i}")).unwrap();
            let mut locations = Vec::new();
            for _ in 0..200 {
                let redirect = target.redirect(&request).unwrap();
                locations.push(redirect.location.to_string());
                tokio::task::yield_now().await;
            }
            (i, locations)
        }));
    }

    for handle in handles {
        let (i, locations) = handle.await.unwrap();
        let expected = format!("https://host{i}.example.com/page/{i}?n={i}");
        assert!(locations.iter().all(|l| *l == expected), "request {i} saw a foreign location");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn weight_updates_are_visible_across_tasks() {
    let target = Arc::new(TargetBuilder::new("web", "http://10.0.0.1/").build().unwrap());

    let writer = {
        let target = Arc::clone(&target);
        tokio::spawn(async move {
            for w in 1..=100 {
                target.set_weight(w as f64);
                tokio::task::yield_now().await;
            }
        })
    };
    let reader = {
        let target = Arc::clone(&target);
        tokio::spawn(async move {
            let mut last = 0.0;
            for _ in 0..100 {
                let w = target.weight();
                assert!(w >= last, "weight went backwards");
                assert_eq!(w.fract(), 0.0);
                last = w;
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(target.weight(), 100.0);
    assert!(target.is_dynamic_weight());
}
