use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gateway_core::{ChatRequest, Gateway, Message, RoutingStrategy};

fn bench_client_creation(c: &mut Criterion) {
    c.bench_function("gateway_builder_assembly", |b| {
        b.iter(|| {
            let _builder = Gateway::builder()
                .with_openai("test-key")
                .with_gemini("test-key")
                .with_routing_strategy(RoutingStrategy::Weighted);
        });
    });
}

fn bench_request_creation(c: &mut Criterion) {
    c.bench_function("chat_request_creation", |b| {
        b.iter(|| {
            let _request = ChatRequest {
                model: "gpt-4".to_string(),
                messages: vec![
                    Message::system("You are a helpful assistant."),
                    Message::user("Hello, how are you?"),
                ],
                temperature: Some(0.7),
                max_tokens: Some(100),
                stream: Some(false),
                ..Default::default()
            };
        });
    });
}

fn bench_message_creation(c: &mut Criterion) {
    c.bench_function("message_creation", |b| {
        b.iter(|| {
            let _user_msg = Message::user("Hello, world!");
            let _assistant_msg = Message::assistant("Hi there!");
            let _system_msg = Message::system("You are a helpful assistant.");
        });
    });
}

fn bench_routing_strategy_creation(c: &mut Criterion) {
    c.bench_function("routing_strategy_creation", |b| {
        b.iter(|| {
            let _cost_optimized = RoutingStrategy::CostOptimized;
            let _performance = RoutingStrategy::Performance;
            let _round_robin = RoutingStrategy::RoundRobin;
            let _health_based = RoutingStrategy::HealthBased;
            let _weighted = RoutingStrategy::Weighted;
        });
    });
}

fn bench_serialization(c: &mut Criterion) {
    let request = ChatRequest {
        model: "gpt-4".to_string(),
        messages: vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello, how are you?"),
        ],
        temperature: Some(0.7),
        max_tokens: Some(100),
        stream: Some(false),
        ..Default::default()
    };

    c.bench_function("request_serialization", |b| {
        b.iter(|| {
            let _json = serde_json::to_string(black_box(&request));
        });
    });

    c.bench_function("request_deserialization", |b| {
        let json = serde_json::to_string(&request).unwrap();
        b.iter(|| {
            let _request: ChatRequest = serde_json::from_str(black_box(&json)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_client_creation,
    bench_request_creation,
    bench_message_creation,
    bench_routing_strategy_creation,
    bench_serialization
);
criterion_main!(benches);
