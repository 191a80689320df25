use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3305")]
    pub port: u16,

    #[envconfig(default = "mysql://root@localhost:3306/test")]
    pub database_url: String,

    /// Target table for the import.
    pub table_name: String,

    /// Path of the delimited input file. The first line is the header.
    pub data_file: String,

    #[envconfig(default = "2")]
    pub worker_count: usize,

    #[envconfig(default = "10")]
    pub max_db_connections: u32,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
