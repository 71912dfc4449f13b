fn main() -> anyhow::Result<()> {
    damage_meter_lib::run(std::env::args().nth(1))
}
