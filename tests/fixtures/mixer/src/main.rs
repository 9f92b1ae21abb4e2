use mixer::{Channel, mix};

fn main() {
    let mut lead = Channel::new("lead");
    lead.set_level(7);

    let backing = Channel::new("backing");
    let level = mix(lead.level, backing.level);
    println!("master level for {}/{}: {level}", lead.name, backing.name);
}
