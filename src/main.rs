use actix_web::{App, HttpServer, middleware::Logger, web};
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use chrono::Local;  // timestamp in log lines
use std::sync::Arc;

use sorteos_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{DohResolver, DomainRegistrar, EmailService, HttpDomainProvider, TelegramService},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    // 外部服务
    let email_service = EmailService::new(config.email.clone());
    let telegram_service = TelegramService::new(config.telegram.clone());
    let registrar: Arc<dyn DomainRegistrar> =
        Arc::new(HttpDomainProvider::new(config.domain_provider.clone()));
    let resolver = DohResolver::new(config.dns.clone());
    let public_base_url = config.server.public_base_url.clone();

    // 业务服务
    let auth_service = AuthService::new(pool.clone(), jwt_service.clone());
    let ticket_service = TicketService::new(pool.clone());
    let job_service = TicketJobService::new(pool.clone(), config.ticket_jobs.clone());
    let raffle_service =
        RaffleService::new(pool.clone(), job_service.clone(), ticket_service.clone());
    let order_service = OrderService::new(
        pool.clone(),
        config.reservation.clone(),
        ticket_service.clone(),
        email_service.clone(),
        public_base_url.clone(),
    );
    let coupon_service = CouponService::new(pool.clone());
    let draw_service = DrawService::new(pool.clone(), email_service.clone());
    let notification_service = NotificationService::new(
        pool.clone(),
        email_service,
        telegram_service,
        public_base_url,
    );
    let domain_service = DomainService::new(
        pool.clone(),
        registrar.clone(),
        resolver,
        &config.domain_provider,
    );
    let organization_service = OrganizationService::new(pool.clone(), registrar);

    // 重启前未完成的票号生成任务继续执行
    match job_service.resume_unfinished().await {
        Ok(n) if n > 0 => log::info!("Resumed {n} unfinished ticket generation jobs"),
        Ok(_) => {}
        Err(e) => log::error!("Failed to resume ticket generation jobs: {e:?}"),
    }

    tasks::spawn_all(
        order_service.clone(),
        draw_service.clone(),
        notification_service.clone(),
        &config.reservation,
        &config.scheduler,
    );

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let cors_origins = config.server.cors_origins.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors(&cors_origins))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(ticket_service.clone()))
            .app_data(web::Data::new(job_service.clone()))
            .app_data(web::Data::new(raffle_service.clone()))
            .app_data(web::Data::new(order_service.clone()))
            .app_data(web::Data::new(coupon_service.clone()))
            .app_data(web::Data::new(draw_service.clone()))
            .app_data(web::Data::new(notification_service.clone()))
            .app_data(web::Data::new(domain_service.clone()))
            .app_data(web::Data::new(organization_service.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::public_config)
                    .configure(handlers::raffle_config)
                    .configure(handlers::order_config)
                    .configure(handlers::ticket_job_config)
                    .configure(handlers::coupon_config)
                    .configure(handlers::domain_config)
                    .configure(handlers::notification_config)
                    .configure(handlers::organization_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
