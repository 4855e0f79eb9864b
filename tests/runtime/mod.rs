mod balancer;
mod completion_queue;
mod metadata;
mod pool;
mod resolver;
mod tls_alpn;
